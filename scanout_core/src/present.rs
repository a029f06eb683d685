// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The present stage: bind a rendered buffer to the layer and collect its
//! release fence.

use crate::backend::Compositor;
use crate::buffer::{BufferId, FrameBuffer};
use crate::display::{DisplayId, LayerId};
use crate::fence::{FenceId, FenceLedger, FenceOwner, NativeFence};
use crate::{PresentError, PresentResult};

/// The composition layer the loop presents into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    id: LayerId,
    display: DisplayId,
    z_order: u32,
    bound: Option<BufferId>,
    acquire: Option<FenceId>,
    frames: u64,
}

impl Layer {
    /// Compositor-assigned id.
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// Display the layer lives on.
    #[must_use]
    pub const fn display(&self) -> DisplayId {
        self.display
    }

    /// Stacking order.
    #[must_use]
    pub const fn z_order(&self) -> u32 {
        self.z_order
    }

    /// Buffer accepted most recently.
    #[must_use]
    pub const fn bound_buffer(&self) -> Option<BufferId> {
        self.bound
    }

    /// Acquire fence handed over with the most recent submission.
    #[must_use]
    pub const fn bound_acquire(&self) -> Option<FenceId> {
        self.acquire
    }

    /// Number of accepted submissions.
    #[must_use]
    pub const fn frames_bound(&self) -> u64 {
        self.frames
    }
}

/// Outcome of an accepted submission.
#[derive(Debug)]
pub struct Submitted {
    /// Acquire fence handed to the compositor.
    pub acquire: FenceId,
    /// Release fence for the submitted buffer.
    pub release: Option<NativeFence>,
}

/// Owns the compositor and the loop's layer.
#[derive(Debug)]
pub struct PresentStage<C> {
    compositor: C,
    layer: Layer,
    ledger: FenceLedger,
    rejections: u64,
}

impl<C> PresentStage<C> {
    /// Creates the layer on `display`.
    pub fn new<H>(
        mut compositor: C,
        display_id: DisplayId,
        z_order: u32,
        ledger: FenceLedger,
    ) -> PresentResult<Self>
    where
        C: Compositor<H>,
    {
        let id = compositor.create_layer(display_id, z_order)?;
        tracing::debug!(layer = ?id, ?display_id, z_order, "layer created");
        Ok(Self {
            compositor,
            layer: Layer {
                id,
                display: display_id,
                z_order,
                bound: None,
                acquire: None,
                frames: 0,
            },
            ledger,
            rejections: 0,
        })
    }

    /// Hands `buffer` and its acquire fence to the compositor.
    ///
    /// The acquire fence is consumed either way. On rejection the layer keeps
    /// its previous binding and the error names the buffer.
    pub fn submit<H>(
        &mut self,
        frame_index: u64,
        buffer: &FrameBuffer<H>,
        acquire: NativeFence,
    ) -> PresentResult<Submitted>
    where
        C: Compositor<H>,
    {
        let acquire_id = acquire.id();
        match self.compositor.submit(self.layer.id, buffer, acquire) {
            Ok(release) => {
                self.layer.bound = Some(buffer.id());
                self.layer.acquire = Some(acquire_id);
                self.layer.frames += 1;
                let release =
                    release.map(|sync| NativeFence::new(sync, FenceOwner::Display, &self.ledger));
                Ok(Submitted {
                    acquire: acquire_id,
                    release,
                })
            }
            Err(rejection) => {
                self.rejections += 1;
                tracing::warn!(
                    buffer = ?buffer.id(),
                    frame_index,
                    reason = %rejection,
                    "submission rejected"
                );
                Err(PresentError::SubmissionRejected {
                    buffer: buffer.id(),
                    frame_index,
                    reason: rejection.reason,
                })
            }
        }
    }

    /// The loop's layer.
    #[must_use]
    pub const fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Submissions the compositor declined.
    #[must_use]
    pub const fn rejections(&self) -> u64 {
        self.rejections
    }

    /// The compositor collaborator.
    #[must_use]
    pub const fn compositor(&self) -> &C {
        &self.compositor
    }
}
