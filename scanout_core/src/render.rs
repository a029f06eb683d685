// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render stage: draw into a buffer and produce its acquire fence.

use crate::PresentResult;
use crate::backend::Renderer;
use crate::buffer::{BufferId, FrameBuffer};
use crate::fence::{ExplicitSync, FenceLedger, NativeFence, SyncBackend};

/// A buffer whose draw work has been issued, with the fence that signals
/// when that work completes.
#[derive(Debug)]
pub struct RenderedFrame {
    /// Buffer drawn into.
    pub buffer: BufferId,
    /// Acquire fence owned by the GPU.
    pub acquire: NativeFence,
}

/// Issues draw work and exports acquire fences.
#[derive(Debug)]
pub struct RenderStage<G> {
    gpu: G,
    sync: ExplicitSync,
    frames_rendered: u64,
}

impl<G: SyncBackend> RenderStage<G> {
    /// Probes `gpu` for explicit-sync support.
    ///
    /// Fails with
    /// [`PresentError::CapabilityUnavailable`](crate::PresentError::CapabilityUnavailable)
    /// before any other resource is touched.
    pub fn new(gpu: G, ledger: FenceLedger) -> PresentResult<Self> {
        let sync = ExplicitSync::probe(&gpu, ledger)?;
        Ok(Self {
            gpu,
            sync,
            frames_rendered: 0,
        })
    }

    /// Draws `frame_index` into `target` and returns its acquire fence.
    ///
    /// The call does not wait for the GPU. If flushing fails, the pending
    /// sync object is destroyed before the error is returned.
    pub fn draw_frame<H>(
        &mut self,
        frame_index: u64,
        target: &FrameBuffer<H>,
    ) -> PresentResult<RenderedFrame>
    where
        G: Renderer<H>,
    {
        self.gpu.draw(frame_index, target)?;
        let pending = self
            .sync
            .create_from_pending_gpu_op(&mut self.gpu, frame_index)?;
        if let Err(err) = self.gpu.flush() {
            self.sync.discard(&mut self.gpu, pending);
            return Err(err);
        }
        let acquire = self.sync.export_native_handle(&mut self.gpu, pending)?;
        self.frames_rendered += 1;
        Ok(RenderedFrame {
            buffer: target.id(),
            acquire,
        })
    }
}

impl<G> RenderStage<G> {
    /// Frames successfully drawn.
    #[must_use]
    pub const fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// The GPU collaborator.
    #[must_use]
    pub const fn gpu(&self) -> &G {
        &self.gpu
    }
}
