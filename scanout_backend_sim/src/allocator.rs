// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface allocation.
//!
//! Simulated surfaces carry no pixels. Each one remembers the frame last drawn
//! into it, which is enough for the compositor to report what was scanned out.

use std::sync::Arc;

use parking_lot::Mutex;
use scanout_core::backend::BufferAllocator;
use scanout_core::buffer::{BufferDesc, BufferId};
use scanout_core::{PresentError, PresentResult};

/// Handle to one simulated surface.
#[derive(Clone, Debug)]
pub struct SimSurface {
    id: BufferId,
    desc: BufferDesc,
    contents: Arc<Mutex<Option<u64>>>,
}

impl SimSurface {
    /// Ring slot the surface was allocated for.
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Layout the surface was allocated with.
    #[must_use]
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Frame most recently drawn into the surface.
    #[must_use]
    pub fn contents(&self) -> Option<u64> {
        *self.contents.lock()
    }

    pub(crate) fn stamp(&self, frame_index: u64) {
        *self.contents.lock() = Some(frame_index);
    }
}

/// Allocator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Surfaces handed out.
    pub allocated: u64,
    /// Surfaces returned.
    pub destroyed: u64,
}

impl AllocatorStats {
    /// Surfaces currently alive.
    #[must_use]
    pub const fn live(&self) -> u64 {
        self.allocated - self.destroyed
    }
}

/// Hands out [`SimSurface`]s up to a per-surface size limit.
#[derive(Debug)]
pub struct SimAllocator {
    max_bytes: u64,
    stats: AllocatorStats,
}

impl SimAllocator {
    /// Creates an allocator refusing surfaces larger than `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            stats: AllocatorStats {
                allocated: 0,
                destroyed: 0,
            },
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> AllocatorStats {
        self.stats
    }
}

impl BufferAllocator for SimAllocator {
    type Handle = SimSurface;

    fn allocate(&mut self, id: BufferId, desc: &BufferDesc) -> PresentResult<SimSurface> {
        let Some(bytes) = desc.byte_len() else {
            return Err(PresentError::allocation(
                id,
                format!("no layout for format {:?}", desc.format),
            ));
        };
        if bytes == 0 || bytes > self.max_bytes {
            return Err(PresentError::allocation(
                id,
                format!("{bytes} bytes outside 1..={}", self.max_bytes),
            ));
        }
        self.stats.allocated += 1;
        tracing::debug!(?id, bytes, "surface allocated");
        Ok(SimSurface {
            id,
            desc: *desc,
            contents: Arc::default(),
        })
    }

    fn destroy(&mut self, handle: SimSurface) {
        self.stats.destroyed += 1;
        tracing::debug!(id = ?handle.id, "surface destroyed");
    }
}
