// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The presentation loop.
//!
//! [`PresentLoop`] owns the collaborators handed to it in a
//! [`PresentContext`] and runs one frame per [`step`](PresentLoop::step):
//!
//! 1. drain vsync notifications;
//! 2. acquire a back buffer (in deferred mode, first reclaim whatever has
//!    already been released);
//! 3. render into it and export the acquire fence;
//! 4. make room for the current front buffer to retire within the pipeline
//!    depth, then submit buffer and acquire fence, receive the release
//!    fence, and mark the buffer in flight;
//! 5. wait for (synchronous) or poll (deferred) the release of the buffers
//!    the new frame superseded, and reclaim them.
//!
//! The loop never reclaims the buffer it just submitted: the front buffer is
//! only released by a later submission.
//!
//! # Release modes
//!
//! [`ReleaseMode::Synchronous`] blocks on every superseded buffer's release
//! fence in the same iteration. Combined with two buffers and a pipeline depth
//! of one, this is the classic double-buffer baseline.
//!
//! [`ReleaseMode::Deferred`] leaves release fences outstanding. The loop only
//! blocks when the retiring queue would exceed
//! [`LoopConfig::pipeline_depth`] or when no buffer is free at acquire time.
//!
//! # Cancellation and teardown
//!
//! A [`CancelToken`] is checked at the top of every iteration, again right
//! before submission, and between slices of every fence wait. On
//! cancellation [`run`](PresentLoop::run) disposes every outstanding fence and
//! destroys every buffer before returning [`LoopExit::Cancelled`]. On any
//! other error the loop stops and leaves its state inspectable; resources are
//! released by [`shutdown`](PresentLoop::shutdown) or on drop.

use core::fmt;
use std::time::Duration;

use crate::backend::{BufferAllocator, Compositor, Renderer};
use crate::buffer::{BufferDesc, BufferId};
use crate::cancel::CancelToken;
use crate::display::DisplayId;
use crate::fence::{FenceId, FenceLedger, FenceWaiter, NativeFence, SyncBackend};
use crate::present::{Layer, PresentStage};
use crate::render::RenderStage;
use crate::ring::{BufferRing, MAX_BUFFERS, Occupancy};
use crate::time::now;
use crate::trace::{
    FrameBeginEvent, FrameSummaryBuilder, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    ReclaimEvent, RingEvent, SubmitEvent, Tracer,
};
use crate::vsync::VsyncMonitor;
use crate::{PresentError, PresentResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// When the loop waits for release fences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ReleaseMode {
    /// Wait for superseded buffers in the iteration that superseded them.
    Synchronous,
    /// Keep release fences outstanding up to the pipeline depth.
    Deferred,
}

/// Tuning knobs for a [`PresentLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct LoopConfig {
    /// Number of ring slots (2 to [`MAX_BUFFERS`]).
    pub buffer_count: u8,
    /// Maximum number of superseded buffers awaiting release
    /// (1 to `buffer_count - 1`).
    pub pipeline_depth: u8,
    /// When release fences are waited on.
    pub release_mode: ReleaseMode,
    /// Bound on any single fence wait.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "fence_timeout_ms", with = "duration_ms")
    )]
    pub fence_timeout: Duration,
    /// Granularity of cancellation checks during fence waits.
    #[cfg_attr(feature = "serde", serde(rename = "wait_slice_ms", with = "duration_ms"))]
    pub wait_slice: Duration,
    /// What every ring slot is allocated as.
    pub buffer: BufferDesc,
    /// Stacking order of the loop's layer.
    pub z_order: u32,
    /// Vsync events buffered between drains.
    pub vsync_capacity: usize,
    /// Stop with [`LoopExit::FrameLimit`] after this many frames.
    pub max_frames: Option<u64>,
}

impl LoopConfig {
    /// Two buffers, depth one, synchronous release.
    #[must_use]
    pub const fn double_buffered(buffer: BufferDesc) -> Self {
        Self {
            buffer_count: 2,
            pipeline_depth: 1,
            release_mode: ReleaseMode::Synchronous,
            fence_timeout: Duration::from_secs(1),
            wait_slice: Duration::from_millis(16),
            buffer,
            z_order: 0,
            vsync_capacity: 16,
            max_frames: None,
        }
    }

    /// Three buffers, depth two, deferred release.
    #[must_use]
    pub const fn triple_buffered(buffer: BufferDesc) -> Self {
        Self {
            buffer_count: 3,
            pipeline_depth: 2,
            release_mode: ReleaseMode::Deferred,
            ..Self::double_buffered(buffer)
        }
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> PresentResult<()> {
        let count = usize::from(self.buffer_count);
        if !(2..=MAX_BUFFERS).contains(&count) {
            return Err(PresentError::invalid_config(format!(
                "buffer_count must be in 2..={MAX_BUFFERS}, got {count}"
            )));
        }
        if self.pipeline_depth == 0 || self.pipeline_depth >= self.buffer_count {
            return Err(PresentError::invalid_config(format!(
                "pipeline_depth must be in 1..{}, got {}",
                self.buffer_count, self.pipeline_depth
            )));
        }
        if self.fence_timeout.is_zero() {
            return Err(PresentError::invalid_config("fence_timeout must be non-zero"));
        }
        if self.wait_slice.is_zero() {
            return Err(PresentError::invalid_config("wait_slice must be non-zero"));
        }
        if self.buffer.width == 0 || self.buffer.height == 0 {
            return Err(PresentError::invalid_config(format!(
                "buffer size {}x{} is empty",
                self.buffer.width, self.buffer.height
            )));
        }
        if self.vsync_capacity == 0 {
            return Err(PresentError::invalid_config("vsync_capacity must be non-zero"));
        }
        Ok(())
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::double_buffered(BufferDesc::default())
    }
}

#[cfg(feature = "serde")]
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Context, reports, exit
// ---------------------------------------------------------------------------

/// Everything the loop needs from the platform, passed in explicitly.
#[derive(Debug)]
pub struct PresentContext<A, G, C> {
    /// Surface provider.
    pub allocator: A,
    /// GPU: renderer and explicit sync.
    pub gpu: G,
    /// Display compositor.
    pub compositor: C,
    /// Display the layer is created on.
    pub display: DisplayId,
}

/// Why [`PresentLoop::run`] returned successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancel token was set; all resources have been released.
    Cancelled,
    /// [`LoopConfig::max_frames`] frames were presented.
    FrameLimit,
}

/// What happened during one [`PresentLoop::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame counter.
    pub frame_index: u64,
    /// Buffer rendered and submitted.
    pub buffer: BufferId,
    /// Acquire fence handed to the compositor.
    pub acquire_fence: FenceId,
    /// Release fence received for `buffer`, if any.
    pub release_fence: Option<FenceId>,
    /// Buffers returned to the free pool during this frame, in order.
    pub reclaimed: Vec<BufferId>,
    /// Whether the loop blocked on a release fence.
    pub waited_for_release: bool,
    /// Ring occupancy at the end of the frame.
    pub occupancy: Occupancy,
}

/// Cumulative loop counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Frames accepted by the compositor.
    pub frames_presented: u64,
    /// Frames during which the loop blocked on a release fence.
    pub release_waits: u64,
    /// Buffers reclaimed.
    pub buffers_reclaimed: u64,
    /// Vsync notifications drained.
    pub vsync_events: u64,
    /// Release fences disposed unobserved at teardown.
    pub fences_abandoned: u64,
}

// ---------------------------------------------------------------------------
// PresentLoop
// ---------------------------------------------------------------------------

/// The fence-synchronized presentation loop.
pub struct PresentLoop<A: BufferAllocator, G, C> {
    config: LoopConfig,
    allocator: A,
    ring: BufferRing<A::Handle>,
    render: RenderStage<G>,
    present: PresentStage<C>,
    vsync: VsyncMonitor,
    waiter: FenceWaiter,
    cancel: CancelToken,
    ledger: FenceLedger,
    frame_index: u64,
    stats: LoopStats,
    shut_down: bool,
}

impl<A, G, C> PresentLoop<A, G, C>
where
    A: BufferAllocator,
    G: SyncBackend + Renderer<A::Handle>,
    C: Compositor<A::Handle>,
{
    /// Validates `config`, probes explicit sync, registers for vsync and
    /// creates the layer, in that order.
    ///
    /// A missing explicit-sync capability fails with
    /// [`PresentError::CapabilityUnavailable`] before the compositor is
    /// touched.
    pub fn new(
        ctx: PresentContext<A, G, C>,
        config: LoopConfig,
        cancel: CancelToken,
    ) -> PresentResult<Self> {
        config.validate()?;
        let PresentContext {
            allocator,
            gpu,
            mut compositor,
            display: display_id,
        } = ctx;

        let ledger = FenceLedger::new();
        let render = RenderStage::new(gpu, ledger.clone())?;

        let (sender, vsync) = VsyncMonitor::channel(config.vsync_capacity);
        compositor.register_vsync(display_id, sender)?;
        let present =
            PresentStage::new::<A::Handle>(compositor, display_id, config.z_order, ledger.clone())?;

        let ring = BufferRing::new(
            usize::from(config.buffer_count),
            usize::from(config.pipeline_depth),
            config.buffer,
        )?;
        let waiter = FenceWaiter::new(Some(config.fence_timeout), config.wait_slice, cancel.clone());

        tracing::info!(
            ?display_id,
            buffers = config.buffer_count,
            depth = config.pipeline_depth,
            mode = ?config.release_mode,
            desc = ?config.buffer,
            "presentation loop ready"
        );
        Ok(Self {
            config,
            allocator,
            ring,
            render,
            present,
            vsync,
            waiter,
            cancel,
            ledger,
            frame_index: 0,
            stats: LoopStats::default(),
            shut_down: false,
        })
    }

    /// Runs until cancelled, until [`LoopConfig::max_frames`], or until a
    /// stage fails.
    pub fn run(&mut self) -> PresentResult<LoopExit> {
        self.run_traced(&mut Tracer::none())
    }

    /// Like [`run`](Self::run), emitting trace events to `tracer`.
    pub fn run_traced(&mut self, tracer: &mut Tracer<'_>) -> PresentResult<LoopExit> {
        loop {
            if self
                .config
                .max_frames
                .is_some_and(|max| self.frame_index >= max)
            {
                tracing::info!(frames = self.frame_index, "frame limit reached");
                return Ok(LoopExit::FrameLimit);
            }
            match self.step(tracer) {
                Ok(_) => {}
                Err(PresentError::Cancelled) => {
                    self.shutdown();
                    return Ok(LoopExit::Cancelled);
                }
                Err(err) => {
                    tracing::error!(
                        frame_index = self.frame_index,
                        error = %err,
                        "presentation loop halted"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Presents one frame.
    pub fn step(&mut self, tracer: &mut Tracer<'_>) -> PresentResult<FrameReport> {
        if self.shut_down || self.cancel.is_cancelled() {
            return Err(PresentError::Cancelled);
        }
        let frame_index = self.frame_index;
        let started = now();
        tracer.frame_begin(&FrameBeginEvent {
            frame_index,
            timestamp: started,
        });
        let mut summary = FrameSummaryBuilder::new(frame_index, started);
        let drained = self.vsync.drain(|e| tracer.vsync(e));
        self.stats.vsync_events += drained as u64;

        let mut reclaimed = Vec::new();
        let mut waited = false;

        // Acquire.
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Acquire);
        if self.config.release_mode == ReleaseMode::Deferred {
            let ids = self.ring.collect_released()?;
            emit_reclaims(tracer, frame_index, &ids, false);
            reclaimed.extend(ids);
        }
        let retiring_before: Vec<BufferId> = self.ring.retiring().collect();
        let buffer = self
            .ring
            .acquire_back_buffer(&mut self.allocator, &self.waiter)?;
        let forced: Vec<BufferId> = retiring_before
            .into_iter()
            .filter(|id| !self.ring.retiring().any(|r| r == *id))
            .collect();
        if !forced.is_empty() {
            tracing::debug!(frame_index, ?forced, "no free buffer, waited for release");
            emit_reclaims(tracer, frame_index, &forced, true);
            waited = true;
            reclaimed.extend(forced);
        }
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Acquire);
        emit_ring(tracer, frame_index, self.ring.occupancy());

        // Render.
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Render);
        let target = self
            .ring
            .buffer(buffer)
            .ok_or_else(|| PresentError::allocation(buffer, "ring slot has no storage"))?;
        let rendered = self.render.draw_frame(frame_index, target)?;
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Render);

        // Submit. The front buffer must have room to retire before the
        // compositor is handed a new one.
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Submit);
        let freed = match self.ring.reserve_retirement(&self.waiter) {
            Ok(freed) => freed,
            Err(err) => {
                self.discard_rendered(buffer, rendered.acquire)?;
                tracing::debug!(
                    frame_index,
                    ?buffer,
                    error = %err,
                    "no room to retire front buffer"
                );
                return Err(err);
            }
        };
        if !freed.is_empty() {
            emit_reclaims(tracer, frame_index, &freed, true);
            waited = true;
            reclaimed.extend(freed);
        }
        if self.cancel.is_cancelled() {
            self.discard_rendered(buffer, rendered.acquire)?;
            tracing::debug!(frame_index, ?buffer, "cancelled before submission");
            return Err(PresentError::Cancelled);
        }
        let target = self
            .ring
            .buffer(buffer)
            .ok_or_else(|| PresentError::allocation(buffer, "ring slot has no storage"))?;
        let submitted = self.present.submit(frame_index, target, rendered.acquire)?;
        let release_fence = submitted.release.as_ref().map(NativeFence::id);
        tracer.submit(&SubmitEvent {
            frame_index,
            buffer,
            acquire_fence: submitted.acquire,
            release_fence,
            submitted_at: now(),
        });
        self.ring.mark_in_flight(buffer, submitted.release)?;
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Submit);
        emit_ring(tracer, frame_index, self.ring.occupancy());

        // Release.
        phase_begin(tracer, &mut summary, frame_index, PhaseKind::Release);
        let (ids, blocked) = match self.config.release_mode {
            ReleaseMode::Synchronous => {
                let ids = self.ring.wait_retiring(&self.waiter)?;
                let blocked = !ids.is_empty();
                (ids, blocked)
            }
            ReleaseMode::Deferred => (self.ring.collect_released()?, false),
        };
        emit_reclaims(tracer, frame_index, &ids, blocked);
        waited |= blocked;
        reclaimed.extend(ids);
        phase_end(tracer, &mut summary, frame_index, PhaseKind::Release);
        let occupancy = self.ring.occupancy();
        emit_ring(tracer, frame_index, occupancy);
        self.ring.check_invariants()?;

        self.frame_index += 1;
        self.stats.frames_presented += 1;
        self.stats.buffers_reclaimed += reclaimed.len() as u64;
        if waited {
            self.stats.release_waits += 1;
        }
        summary.set_waited_for_release(waited);
        tracer.frame_summary(&summary.finish(buffer, occupancy));
        tracing::debug!(
            frame_index,
            ?buffer,
            ?reclaimed,
            waited,
            ?occupancy,
            "frame presented"
        );

        Ok(FrameReport {
            frame_index,
            buffer,
            acquire_fence: submitted.acquire,
            release_fence,
            reclaimed,
            waited_for_release: waited,
            occupancy,
        })
    }
}

impl<A: BufferAllocator, G, C> PresentLoop<A, G, C> {
    /// Returns a rendered but unsubmitted buffer to the ring.
    fn discard_rendered(&mut self, buffer: BufferId, acquire: NativeFence) -> PresentResult<()> {
        acquire.dispose();
        self.ring.cancel_rendering(buffer)
    }

    /// Disposes every outstanding fence and destroys every buffer.
    /// Idempotent; after it runs, [`step`](Self::step) reports cancellation.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let fences = self.ring.abandon_in_flight();
        let buffers = self.ring.destroy_buffers(&mut self.allocator);
        self.stats.fences_abandoned += fences as u64;
        tracing::info!(
            frames = self.stats.frames_presented,
            fences,
            buffers,
            outstanding = self.ledger.outstanding(),
            "presentation loop shut down"
        );
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Buffer ring, for inspection.
    #[must_use]
    pub const fn ring(&self) -> &BufferRing<A::Handle> {
        &self.ring
    }

    /// Fence ledger shared by every fence this loop created or received.
    #[must_use]
    pub const fn ledger(&self) -> &FenceLedger {
        &self.ledger
    }

    /// Cumulative counters.
    #[must_use]
    pub const fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Index of the next frame.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The loop's composition layer.
    #[must_use]
    pub const fn layer(&self) -> &Layer {
        self.present.layer()
    }

    /// Present stage (and through it, the compositor).
    #[must_use]
    pub const fn present(&self) -> &PresentStage<C> {
        &self.present
    }

    /// Render stage (and through it, the GPU).
    #[must_use]
    pub const fn render(&self) -> &RenderStage<G> {
        &self.render
    }

    /// Surface provider.
    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Vsync monitor.
    #[must_use]
    pub const fn vsync(&self) -> &VsyncMonitor {
        &self.vsync
    }

    /// Token that stops this loop.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<A: BufferAllocator, G, C> Drop for PresentLoop<A, G, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<A: BufferAllocator, G, C> fmt::Debug for PresentLoop<A, G, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentLoop")
            .field("config", &self.config)
            .field("ring", &self.ring)
            .field("frame_index", &self.frame_index)
            .field("stats", &self.stats)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Trace helpers
// ---------------------------------------------------------------------------

fn phase_begin(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame_index: u64,
    phase: PhaseKind,
) {
    let timestamp = now();
    summary.phase_begin(phase, timestamp);
    tracer.phase_begin(&PhaseBeginEvent {
        frame_index,
        phase,
        timestamp,
    });
}

fn phase_end(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame_index: u64,
    phase: PhaseKind,
) {
    let timestamp = now();
    summary.phase_end(phase, timestamp);
    tracer.phase_end(&PhaseEndEvent {
        frame_index,
        phase,
        timestamp,
    });
}

fn emit_reclaims(tracer: &mut Tracer<'_>, frame_index: u64, ids: &[BufferId], waited: bool) {
    if ids.is_empty() || !tracer.is_enabled() {
        return;
    }
    let timestamp = now();
    for &buffer in ids {
        tracer.reclaim(&ReclaimEvent {
            frame_index,
            buffer,
            waited,
            timestamp,
        });
    }
}

fn emit_ring(tracer: &mut Tracer<'_>, frame_index: u64, occupancy: Occupancy) {
    if tracer.is_enabled() {
        tracer.ring(&RingEvent {
            frame_index,
            occupancy,
            timestamp: now(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
