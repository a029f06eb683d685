// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the presentation pipeline.
//!
//! Every variant except [`PresentError::Cancelled`] terminates the loop.
//! There is no partial-success mode: a frame is either fully presented or the
//! loop halts and reports why.

use std::io;
use std::time::Duration;

use crate::buffer::BufferId;
use crate::fence::{FenceId, FenceOwner};
use crate::ring::BufferState;

/// Convenience alias used throughout the crate.
pub type PresentResult<T> = Result<T, PresentError>;

/// Errors surfaced by the fence primitive, the buffer ring, the stages and
/// the loop driver.
#[derive(thiserror::Error, Debug)]
pub enum PresentError {
    /// A required explicit-sync capability is missing. Fatal at startup.
    #[error("capability unavailable: {capability}")]
    CapabilityUnavailable {
        /// Name of the missing extension or feature.
        capability: &'static str,
    },

    /// The compositor declined a frame.
    #[error("submission of {buffer:?} (frame {frame_index}) rejected: {reason}")]
    SubmissionRejected {
        /// Buffer that was being submitted. It stays in the rendering state.
        buffer: BufferId,
        /// Frame the submission belonged to.
        frame_index: u64,
        /// Compositor-provided reason.
        reason: String,
    },

    /// A fence wait exceeded its bound.
    #[error("{owner:?} fence {fence:?} did not signal within {timeout:?}")]
    FenceTimeout {
        /// Fence that was waited on.
        fence: FenceId,
        /// Party expected to signal it.
        owner: FenceOwner,
        /// Bound that was exceeded.
        timeout: Duration,
    },

    /// No buffer is free and none is awaiting release.
    #[error("buffer ring exhausted ({slots} slots, none free or retiring)")]
    BufferExhausted {
        /// Ring size.
        slots: usize,
    },

    /// A fence reported an error state while being waited on.
    #[error("{owner:?} fence {fence:?} failed")]
    FenceFailed {
        /// Fence that failed.
        fence: FenceId,
        /// Party expected to signal it.
        owner: FenceOwner,
        /// Underlying error from the native object.
        #[source]
        source: io::Error,
    },

    /// The renderer could not produce a frame (device lost, out of memory).
    #[error("render error at frame {frame_index}: {reason}")]
    Render {
        /// Frame being rendered.
        frame_index: u64,
        /// Renderer-provided reason.
        reason: String,
    },

    /// The surface provider could not allocate a buffer.
    #[error("allocation of {buffer:?} failed: {reason}")]
    Allocation {
        /// Ring slot being populated.
        buffer: BufferId,
        /// Allocator-provided reason.
        reason: String,
    },

    /// A reclaim was attempted before the buffer's release was observed.
    #[error("{buffer:?} reclaimed before its release fence was observed")]
    ReleaseNotObserved {
        /// Buffer whose reclaim was refused.
        buffer: BufferId,
    },

    /// A buffer state transition that the ring discipline forbids.
    #[error("invalid transition for {buffer:?}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Buffer involved.
        buffer: BufferId,
        /// Current state.
        from: BufferState,
        /// Requested state.
        to: BufferState,
    },

    /// The loop configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The loop observed an external cancellation request.
    #[error("presentation cancelled")]
    Cancelled,
}

impl PresentError {
    /// Builds a [`PresentError::Render`].
    pub fn render(frame_index: u64, reason: impl Into<String>) -> Self {
        Self::Render {
            frame_index,
            reason: reason.into(),
        }
    }

    /// Builds a [`PresentError::Allocation`].
    pub fn allocation(buffer: BufferId, reason: impl Into<String>) -> Self {
        Self::Allocation {
            buffer,
            reason: reason.into(),
        }
    }

    /// Builds a [`PresentError::InvalidConfig`].
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Returns `true` for conditions that indicate a broken ring discipline
    /// rather than a platform failure.
    #[must_use]
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            Self::BufferExhausted { .. }
                | Self::ReleaseNotObserved { .. }
                | Self::InvalidTransition { .. }
        )
    }
}
