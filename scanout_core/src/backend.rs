// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for platform integrations.
//!
//! The loop talks to three collaborators, each supplied by a platform crate:
//!
//! - **Surface provider**: implements [`BufferAllocator`], which creates and
//!   destroys presentable buffers from a [`BufferDesc`]. Allocation is lazy;
//!   the ring asks for a slot's storage the first time it is acquired.
//!
//! - **GPU**: implements [`Renderer`] to draw a frame into a buffer and
//!   [`SyncBackend`](crate::fence::SyncBackend) to capture the pending draw as
//!   a GPU sync object and export it as a native fence.
//!
//! - **Display compositor**: implements [`Compositor`], which creates the layer,
//!   accepts `(buffer, acquire fence)` submissions and answers each with an
//!   optional release fence, and pushes vblank notifications through a
//!   [`VsyncSender`].
//!
//! # Fence ownership at the seams
//!
//! [`Compositor::submit`] takes the acquire [`NativeFence`] by value. From
//! that point the compositor owns it and drops it once it has waited on it;
//! dropping a [`NativeFence`] disposes it. The release fence comes back as a
//! raw [`NativeSync`]; the present stage wraps it into a tracked
//! [`NativeFence`] immediately.
//!
//! # Crate boundaries
//!
//! `scanout_core` owns the ring, the stages, the loop and this contract
//! module. Platform crates depend on `scanout_core`; application code depends
//! on both and wires them together through a
//! [`PresentContext`](crate::pipeline::PresentContext).

use crate::PresentResult;
use crate::buffer::{BufferDesc, BufferId, FrameBuffer};
use crate::display::{DisplayConfig, DisplayId, LayerId};
use crate::fence::{NativeFence, NativeSync};
use crate::vsync::VsyncSender;

/// Creates and destroys presentable buffers.
pub trait BufferAllocator {
    /// Opaque handle to one allocated buffer.
    type Handle;

    /// Allocates storage for ring slot `id`.
    ///
    /// Failures should be reported as
    /// [`PresentError::Allocation`](crate::PresentError::Allocation).
    fn allocate(&mut self, id: BufferId, desc: &BufferDesc) -> PresentResult<Self::Handle>;

    /// Releases a buffer's storage. Called once per allocated handle, during
    /// loop shutdown.
    fn destroy(&mut self, handle: Self::Handle);
}

/// Issues GPU draw work into a buffer.
pub trait Renderer<H> {
    /// Records the draw commands for `frame_index` targeting `target`.
    ///
    /// The work may still be executing when this returns; completion is
    /// observed through the acquire fence.
    fn draw(&mut self, frame_index: u64, target: &FrameBuffer<H>) -> PresentResult<()>;

    /// Flushes recorded work to the GPU so that a sync object created after
    /// [`draw`](Self::draw) will eventually signal.
    fn flush(&mut self) -> PresentResult<()>;
}

/// The compositor's reason for declining a submission.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    /// Human-readable reason.
    pub reason: String,
}

impl Rejection {
    /// Creates a rejection.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Display-side collaborator: layers, submissions and vblank delivery.
pub trait Compositor<H> {
    /// Creates a composition layer on `display` at the given stacking order.
    fn create_layer(&mut self, display: DisplayId, z_order: u32) -> PresentResult<LayerId>;

    /// Binds `buffer` to `layer` and queues it for scan-out once `acquire`
    /// signals.
    ///
    /// Returns the release fence for `buffer`, which signals once the display
    /// no longer reads it, or `None` when the compositor gives no release
    /// fence for this submission.
    fn submit(
        &mut self,
        layer: LayerId,
        buffer: &FrameBuffer<H>,
        acquire: NativeFence,
    ) -> Result<Option<Box<dyn NativeSync>>, Rejection>;

    /// Registers the channel vblank notifications for `display` are delivered
    /// on. Compositors must never block on the sender.
    fn register_vsync(&mut self, display: DisplayId, sender: VsyncSender) -> PresentResult<()>;

    /// Lists the modes `display` supports.
    fn display_configs(&self, display: DisplayId) -> Vec<DisplayConfig> {
        let _ = display;
        Vec::new()
    }

    /// Returns the id of the mode `display` is currently driven in.
    fn active_config(&self, display: DisplayId) -> Option<u32> {
        let _ = display;
        None
    }
}
