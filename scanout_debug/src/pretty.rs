// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use scanout_core::ring::Occupancy;
use scanout_core::time::{HostTime, Timebase};
use scanout_core::trace::{
    FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, ReclaimEvent, RingEvent,
    SubmitEvent, TraceSink,
};
use scanout_core::vsync::VsyncEvent;

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
    vsync: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .field("vsync", &self.vsync)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self::new(Box::new(std::io::stderr()), timebase)
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self::with_writer(writer, timebase)
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self {
            writer,
            timebase,
            vsync: true,
        }
    }

    /// Suppresses the per-vblank lines, which dominate output on fast
    /// displays.
    #[must_use]
    pub fn without_vsync(mut self) -> Self {
        self.vsync = false;
        self
    }

    /// Returns the destination.
    pub fn into_inner(self) -> W {
        self.writer
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "microsecond display precision is enough"
    )]
    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn occupancy(o: Occupancy) -> String {
    format!(
        "free={} rendering={} in_flight={} retiring={}",
        o.free, o.rendering, o.in_flight, o.retiring
    )
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] frame={} at {:.1}µs",
            e.frame_index,
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            self.host_us(e.timestamp),
        );
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        let release = e
            .release_fence
            .map_or_else(|| "none".to_owned(), |f| f.0.to_string());
        let _ = writeln!(
            self.writer,
            "[submit] frame={} buffer={} acquire={} release={release} at {:.1}µs",
            e.frame_index,
            e.buffer.0,
            e.acquire_fence.0,
            self.host_us(e.submitted_at),
        );
    }

    fn on_reclaim(&mut self, e: &ReclaimEvent) {
        let how = if e.waited { "waited" } else { "polled" };
        let _ = writeln!(
            self.writer,
            "[reclaim] frame={} buffer={} {how} at {:.1}µs",
            e.frame_index,
            e.buffer.0,
            self.host_us(e.timestamp),
        );
    }

    fn on_ring(&mut self, e: &RingEvent) {
        let _ = writeln!(
            self.writer,
            "[ring] frame={} {}",
            e.frame_index,
            occupancy(e.occupancy),
        );
    }

    fn on_vsync(&mut self, e: &VsyncEvent) {
        if !self.vsync {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[vsync] display={} at {:.1}µs",
            e.display.0,
            self.host_us(e.timestamp),
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let release = if s.waited_for_release {
            "BLOCKED"
        } else {
            "ok"
        };
        let _ = writeln!(
            self.writer,
            "[summary] frame={} buffer={} acquire={:.1}µs render={:.1}µs \
             submit={:.1}µs release={:.1}µs ({release}) {}",
            s.frame_index,
            s.buffer.0,
            self.ticks_to_us(s.acquire_ticks),
            self.ticks_to_us(s.render_ticks),
            self.ticks_to_us(s.submit_ticks),
            self.ticks_to_us(s.release_ticks),
            occupancy(s.occupancy),
        );
    }
}
