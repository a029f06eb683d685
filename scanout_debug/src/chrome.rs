// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//! Loop phases become duration slices, ring occupancy becomes a counter track,
//! and vblanks, submissions and reclaims become instant markers.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use scanout_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

const LOOP_TID: u32 = 0;
const VSYNC_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let events: Vec<Value> = decode(bytes)
        .map(|recorded| to_json(recorded, timebase))
        .collect();
    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn to_json(recorded: RecordedEvent, timebase: Timebase) -> Value {
    match recorded {
        RecordedEvent::FrameBegin(e) => json!({
            "ph": "i",
            "name": "FrameBegin",
            "cat": "Frame",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "s": "t",
            "args": {
                "frame_index": e.frame_index,
            }
        }),
        RecordedEvent::PhaseBegin(e) => json!({
            "ph": "B",
            "name": e.phase.name(),
            "cat": "Frame",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "args": {
                "frame_index": e.frame_index,
            }
        }),
        RecordedEvent::PhaseEnd(e) => json!({
            "ph": "E",
            "name": e.phase.name(),
            "cat": "Frame",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "args": {
                "frame_index": e.frame_index,
            }
        }),
        RecordedEvent::Submit(e) => json!({
            "ph": "i",
            "name": "Submit",
            "cat": "Fence",
            "ts": ticks_to_us(e.submitted_at.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "s": "t",
            "args": {
                "frame_index": e.frame_index,
                "buffer": e.buffer.0,
                "acquire_fence": e.acquire_fence.0,
                "release_fence": e.release_fence.map(|f| f.0),
            }
        }),
        RecordedEvent::Reclaim(e) => json!({
            "ph": "i",
            "name": "Reclaim",
            "cat": "Fence",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "s": "t",
            "args": {
                "frame_index": e.frame_index,
                "buffer": e.buffer.0,
                "waited": e.waited,
            }
        }),
        RecordedEvent::Ring(e) => json!({
            "ph": "C",
            "name": "Ring",
            "cat": "Ring",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "args": {
                "free": e.occupancy.free,
                "rendering": e.occupancy.rendering,
                "in_flight": e.occupancy.in_flight,
                "retiring": e.occupancy.retiring,
            }
        }),
        RecordedEvent::Vsync(e) => json!({
            "ph": "i",
            "name": "Vsync",
            "cat": "Display",
            "ts": ticks_to_us(e.timestamp.ticks(), timebase),
            "pid": 0,
            "tid": VSYNC_TID,
            "s": "p",
            "args": {
                "display": e.display.0,
            }
        }),
        RecordedEvent::FrameSummary(s) => json!({
            "ph": "i",
            "name": "FrameSummary",
            "cat": "Summary",
            "ts": ticks_to_us(s.started.ticks(), timebase),
            "pid": 0,
            "tid": LOOP_TID,
            "s": "t",
            "args": {
                "frame_index": s.frame_index,
                "buffer": s.buffer.0,
                "acquire_us": ticks_to_us(s.acquire_ticks, timebase),
                "render_us": ticks_to_us(s.render_ticks, timebase),
                "submit_us": ticks_to_us(s.submit_ticks, timebase),
                "release_us": ticks_to_us(s.release_ticks, timebase),
                "waited_for_release": s.waited_for_release,
            }
        }),
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "trace viewers take float microseconds"
)]
fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use scanout_core::buffer::BufferId;
    use scanout_core::ring::Occupancy;
    use scanout_core::time::HostTime;
    use scanout_core::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, RingEvent, TraceSink};

    use super::*;
    use crate::recorder::RecorderSink;

    fn parse(rec: &RecorderSink) -> Vec<Value> {
        let mut out = Vec::new();
        export(rec.as_bytes(), Timebase::NANOS, &mut out).expect("export");
        serde_json::from_slice(&out).expect("valid JSON array")
    }

    #[test]
    fn phases_become_duration_slices() {
        let mut rec = RecorderSink::new();
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Acquire,
            timestamp: HostTime(1_000_000),
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Acquire,
            timestamp: HostTime(1_000_500),
        });

        let parsed = parse(&rec);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "acquire");
        assert_eq!(parsed[0]["ts"], 1_000.0);
        assert_eq!(parsed[1]["ph"], "E");
        assert_eq!(parsed[1]["ts"], 1_000.5);
    }

    #[test]
    fn ring_occupancy_is_a_counter() {
        let mut rec = RecorderSink::new();
        rec.on_ring(&RingEvent {
            frame_index: 1,
            occupancy: Occupancy {
                free: 0,
                rendering: 1,
                in_flight: 2,
                retiring: 1,
            },
            timestamp: HostTime(2_000),
        });
        rec.on_reclaim(&scanout_core::trace::ReclaimEvent {
            frame_index: 1,
            buffer: BufferId(2),
            waited: false,
            timestamp: HostTime(3_000),
        });

        let parsed = parse(&rec);
        assert_eq!(parsed[0]["ph"], "C");
        assert_eq!(parsed[0]["args"]["in_flight"], 2);
        assert_eq!(parsed[0]["args"]["retiring"], 1);
        assert_eq!(parsed[1]["name"], "Reclaim");
        assert_eq!(parsed[1]["args"]["waited"], false);
    }

    #[test]
    fn export_empty_recording() {
        let parsed = parse(&RecorderSink::new());
        assert!(parsed.is_empty(), "no events");
    }
}
