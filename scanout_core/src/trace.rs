// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-phase instrumentation for the presentation loop.
//!
//! This module provides a [`TraceSink`] trait with one method per event the
//! loop emits. All method bodies default to no-ops, so implementing only the
//! events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`; each method performs a
//! single `Option` branch before dispatching. The loop always runs through a
//! `Tracer`, so `Tracer::none()` is the zero-sink case.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during a frame and
//! produces a [`FrameSummary`] at the end.
//!
//! Structured trace events are separate from `tracing` logs: logs are for
//! humans, these events are for tools (see the `scanout_debug` crate).

use crate::buffer::BufferId;
use crate::fence::FenceId;
use crate::ring::Occupancy;
use crate::time::HostTime;
use crate::vsync::VsyncEvent;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a loop iteration is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Obtaining a back buffer, including any backpressure wait.
    Acquire,
    /// Issuing draw work and exporting the acquire fence.
    Render,
    /// Handing the buffer to the compositor.
    Submit,
    /// Waiting for or polling release fences.
    Release,
}

impl PhaseKind {
    /// All phases in loop order.
    pub const ALL: [Self; 4] = [Self::Acquire, Self::Render, Self::Submit, Self::Release];

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Render => "render",
            Self::Submit => "submit",
            Self::Release => "release",
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Marks the beginning of a loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Host time at iteration start.
    pub timestamp: HostTime,
}

/// Marks the beginning of a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted when the compositor accepts a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Buffer submitted.
    pub buffer: BufferId,
    /// Acquire fence handed over.
    pub acquire_fence: FenceId,
    /// Release fence received, if any.
    pub release_fence: Option<FenceId>,
    /// Host time of submission.
    pub submitted_at: HostTime,
}

/// Emitted when a retiring buffer returns to the free pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclaimEvent {
    /// Frame during which the reclaim happened.
    pub frame_index: u64,
    /// Buffer reclaimed.
    pub buffer: BufferId,
    /// Whether the loop blocked on the release fence.
    pub waited: bool,
    /// Host time of the reclaim.
    pub timestamp: HostTime,
}

/// Ring occupancy after a loop-driven transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Per-state counts.
    pub occupancy: Occupancy,
    /// Host time of the observation.
    pub timestamp: HostTime,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Buffer rendered and submitted.
    pub buffer: BufferId,
    /// Host time at iteration start.
    pub started: HostTime,
    /// Acquire phase duration in ticks (0 if not measured).
    pub acquire_ticks: u64,
    /// Render phase duration in ticks (0 if not measured).
    pub render_ticks: u64,
    /// Submit phase duration in ticks (0 if not measured).
    pub submit_ticks: u64,
    /// Release phase duration in ticks (0 if not measured).
    pub release_ticks: u64,
    /// Whether the loop blocked on a release fence this frame.
    pub waited_for_release: bool,
    /// Ring occupancy at the end of the frame.
    pub occupancy: Occupancy,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the presentation loop.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called at the start of every iteration.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a frame is accepted by the compositor.
    fn on_submit(&mut self, e: &SubmitEvent) {
        _ = e;
    }

    /// Called when a buffer is reclaimed.
    fn on_reclaim(&mut self, e: &ReclaimEvent) {
        _ = e;
    }

    /// Called after each loop-driven ring transition.
    fn on_ring(&mut self, e: &RingEvent) {
        _ = e;
    }

    /// Called for each vblank drained from the vsync channel.
    fn on_vsync(&mut self, e: &VsyncEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    sink: Option<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self { sink: None }
    }

    /// Returns `true` when a sink is attached.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
    }

    /// Emits a [`SubmitEvent`].
    #[inline]
    pub fn submit(&mut self, e: &SubmitEvent) {
        if let Some(s) = &mut self.sink {
            s.on_submit(e);
        }
    }

    /// Emits a [`ReclaimEvent`].
    #[inline]
    pub fn reclaim(&mut self, e: &ReclaimEvent) {
        if let Some(s) = &mut self.sink {
            s.on_reclaim(e);
        }
    }

    /// Emits a [`RingEvent`].
    #[inline]
    pub fn ring(&mut self, e: &RingEvent) {
        if let Some(s) = &mut self.sink {
            s.on_ring(e);
        }
    }

    /// Emits a [`VsyncEvent`].
    #[inline]
    pub fn vsync(&mut self, e: &VsyncEvent) {
        if let Some(s) = &mut self.sink {
            s.on_vsync(e);
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame_index: u64,
    started: HostTime,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
    waited_for_release: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for `frame_index`.
    #[must_use]
    pub fn new(frame_index: u64, started: HostTime) -> Self {
        Self {
            frame_index,
            started,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
            waited_for_release: false,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Notes that the loop blocked on a release fence.
    pub fn set_waited_for_release(&mut self, waited: bool) {
        self.waited_for_release |= waited;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self, buffer: BufferId, occupancy: Occupancy) -> FrameSummary {
        FrameSummary {
            frame_index: self.frame_index,
            buffer,
            started: self.started,
            acquire_ticks: self.phase_duration(PhaseKind::Acquire),
            render_ticks: self.phase_duration(PhaseKind::Render),
            submit_ticks: self.phase_duration(PhaseKind::Submit),
            release_ticks: self.phase_duration(PhaseKind::Release),
            waited_for_release: self.waited_for_release,
            occupancy,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_since(start).ticks(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Acquire => 0,
        PhaseKind::Render => 1,
        PhaseKind::Submit => 2,
        PhaseKind::Release => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayId;

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_frame_begin(&FrameBeginEvent {
            frame_index: 0,
            timestamp: HostTime(0),
        });
        sink.on_vsync(&VsyncEvent {
            display: DisplayId::PRIMARY,
            timestamp: HostTime(5),
        });
        sink.on_frame_summary(&FrameSummaryBuilder::new(0, HostTime(0)).finish(
            BufferId(0),
            Occupancy::default(),
        ));
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        assert!(!tracer.is_enabled());
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: 1,
            phase: PhaseKind::Render,
            timestamp: HostTime(10),
        });
    }

    #[test]
    fn tracer_dispatches_to_sink() {
        #[derive(Default)]
        struct RecordingSink {
            submits: Vec<BufferId>,
            reclaims: Vec<(BufferId, bool)>,
        }
        impl TraceSink for RecordingSink {
            fn on_submit(&mut self, e: &SubmitEvent) {
                self.submits.push(e.buffer);
            }
            fn on_reclaim(&mut self, e: &ReclaimEvent) {
                self.reclaims.push((e.buffer, e.waited));
            }
        }

        let mut sink = RecordingSink::default();
        let mut tracer = Tracer::new(&mut sink);
        tracer.submit(&SubmitEvent {
            frame_index: 3,
            buffer: BufferId(1),
            acquire_fence: FenceId(6),
            release_fence: Some(FenceId(7)),
            submitted_at: HostTime(100),
        });
        tracer.reclaim(&ReclaimEvent {
            frame_index: 3,
            buffer: BufferId(0),
            waited: true,
            timestamp: HostTime(120),
        });
        drop(tracer);
        assert_eq!(sink.submits, vec![BufferId(1)]);
        assert_eq!(sink.reclaims, vec![(BufferId(0), true)]);
    }

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = FrameSummaryBuilder::new(42, HostTime(1_000_000));
        builder.phase_begin(PhaseKind::Acquire, HostTime(1_000_000));
        builder.phase_end(PhaseKind::Acquire, HostTime(1_000_100));
        builder.phase_begin(PhaseKind::Render, HostTime(1_000_100));
        builder.phase_end(PhaseKind::Render, HostTime(1_000_500));
        builder.phase_begin(PhaseKind::Submit, HostTime(1_000_500));
        builder.phase_end(PhaseKind::Submit, HostTime(1_002_000));
        builder.phase_begin(PhaseKind::Release, HostTime(1_002_000));
        builder.phase_end(PhaseKind::Release, HostTime(1_002_050));
        builder.set_waited_for_release(true);
        builder.set_waited_for_release(false);

        let occupancy = Occupancy {
            free: 1,
            rendering: 0,
            in_flight: 1,
            retiring: 0,
        };
        let summary = builder.finish(BufferId(1), occupancy);
        assert_eq!(summary.acquire_ticks, 100);
        assert_eq!(summary.render_ticks, 400);
        assert_eq!(summary.submit_ticks, 1_500);
        assert_eq!(summary.release_ticks, 50);
        assert!(summary.waited_for_release, "a wait anywhere in the frame sticks");
        assert_eq!(summary.frame_index, 42);
        assert_eq!(summary.occupancy, occupancy);
    }

    #[test]
    fn summary_builder_missing_phases_are_zero() {
        let summary = FrameSummaryBuilder::new(0, HostTime(0)).finish(BufferId(0), Occupancy::default());
        assert_eq!(summary.acquire_ticks, 0);
        assert_eq!(summary.release_ticks, 0);
        assert!(!summary.waited_for_release);
    }

    #[test]
    fn phase_names_are_stable() {
        let names: Vec<_> = PhaseKind::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["acquire", "render", "submit", "release"]);
    }
}
