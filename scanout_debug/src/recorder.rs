// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as tagged little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`]. Decoding stops at the first unknown tag or
//! truncated record.

use scanout_core::buffer::BufferId;
use scanout_core::display::DisplayId;
use scanout_core::fence::FenceId;
use scanout_core::ring::Occupancy;
use scanout_core::time::HostTime;
use scanout_core::trace::{
    FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, ReclaimEvent,
    RingEvent, SubmitEvent, TraceSink,
};
use scanout_core::vsync::VsyncEvent;

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_SUBMIT: u8 = 4;
const TAG_RECLAIM: u8 = 5;
const TAG_RING: u8 = 6;
const TAG_VSYNC: u8 = 7;
const TAG_FRAME_SUMMARY: u8 = 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u64(val);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Acquire => 0,
            PhaseKind::Render => 1,
            PhaseKind::Submit => 2,
            PhaseKind::Release => 3,
        });
    }

    fn write_occupancy(&mut self, o: Occupancy) {
        self.write_u8(o.free);
        self.write_u8(o.rendering);
        self.write_u8(o.in_flight);
        self.write_u8(o.retiring);
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.write_u8(TAG_FRAME_BEGIN);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_submit(&mut self, e: &SubmitEvent) {
        self.write_u8(TAG_SUBMIT);
        self.write_u64(e.frame_index);
        self.write_u32(e.buffer.0);
        self.write_u64(e.acquire_fence.0);
        self.write_option_u64(e.release_fence.map(|f| f.0));
        self.write_u64(e.submitted_at.ticks());
    }

    fn on_reclaim(&mut self, e: &ReclaimEvent) {
        self.write_u8(TAG_RECLAIM);
        self.write_u64(e.frame_index);
        self.write_u32(e.buffer.0);
        self.write_u8(u8::from(e.waited));
        self.write_u64(e.timestamp.ticks());
    }

    fn on_ring(&mut self, e: &RingEvent) {
        self.write_u8(TAG_RING);
        self.write_u64(e.frame_index);
        self.write_occupancy(e.occupancy);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_vsync(&mut self, e: &VsyncEvent) {
        self.write_u8(TAG_VSYNC);
        self.write_u32(e.display.0);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_u32(s.buffer.0);
        self.write_u64(s.started.ticks());
        self.write_u64(s.acquire_ticks);
        self.write_u64(s.render_ticks);
        self.write_u64(s.submit_ticks);
        self.write_u64(s.release_ticks);
        self.write_u8(u8::from(s.waited_for_release));
        self.write_occupancy(s.occupancy);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`FrameBeginEvent`].
    FrameBegin(FrameBeginEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`SubmitEvent`].
    Submit(SubmitEvent),
    /// A [`ReclaimEvent`].
    Reclaim(ReclaimEvent),
    /// A [`RingEvent`].
    Ring(RingEvent),
    /// A [`VsyncEvent`].
    Vsync(VsyncEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_u8()?;
        let val = self.read_u64()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        PhaseKind::ALL.get(usize::from(self.read_u8()?)).copied()
    }

    fn read_occupancy(&mut self) -> Option<Occupancy> {
        Some(Occupancy {
            free: self.read_u8()?,
            rendering: self.read_u8()?,
            in_flight: self.read_u8()?,
            retiring: self.read_u8()?,
        })
    }

    fn decode_frame_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameBegin(FrameBeginEvent {
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_submit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Submit(SubmitEvent {
            frame_index: self.read_u64()?,
            buffer: BufferId(self.read_u32()?),
            acquire_fence: FenceId(self.read_u64()?),
            release_fence: self.read_option_u64()?.map(FenceId),
            submitted_at: self.read_time()?,
        }))
    }

    fn decode_reclaim(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Reclaim(ReclaimEvent {
            frame_index: self.read_u64()?,
            buffer: BufferId(self.read_u32()?),
            waited: self.read_bool()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_ring(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Ring(RingEvent {
            frame_index: self.read_u64()?,
            occupancy: self.read_occupancy()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_vsync(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Vsync(VsyncEvent {
            display: DisplayId(self.read_u32()?),
            timestamp: self.read_time()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            buffer: BufferId(self.read_u32()?),
            started: self.read_time()?,
            acquire_ticks: self.read_u64()?,
            render_ticks: self.read_u64()?,
            submit_ticks: self.read_u64()?,
            release_ticks: self.read_u64()?,
            waited_for_release: self.read_bool()?,
            occupancy: self.read_occupancy()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_FRAME_BEGIN => self.decode_frame_begin(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_SUBMIT => self.decode_submit(),
            TAG_RECLAIM => self.decode_reclaim(),
            TAG_RING => self.decode_ring(),
            TAG_VSYNC => self.decode_vsync(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
