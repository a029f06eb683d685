// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explicit synchronization between GPU sync objects and native fences.

use core::fmt;

use super::{FenceLedger, FenceOwner, NativeFence, NativeSync};
use crate::{PresentError, PresentResult};

/// GPU-side sync object support.
///
/// The GPU records a sync object after issuing draw work; exporting it yields
/// a native handle that other processes (the compositor) can wait on.
pub trait SyncBackend {
    /// GPU-local sync object.
    type Sync;

    /// Whether native fence export is supported at all. Checked once at
    /// startup.
    fn has_native_fence_sync(&self) -> bool;

    /// Name of the capability reported when
    /// [`has_native_fence_sync`](Self::has_native_fence_sync) is `false`.
    fn capability_name(&self) -> &'static str {
        "native fence sync"
    }

    /// Creates a sync object covering all work issued so far.
    fn create_sync(&mut self) -> PresentResult<Self::Sync>;

    /// Exports a native handle for `sync`. The GPU-local object stays alive
    /// until [`destroy_sync`](Self::destroy_sync).
    fn export_sync(&mut self, sync: &Self::Sync) -> PresentResult<Box<dyn NativeSync>>;

    /// Destroys the GPU-local object.
    fn destroy_sync(&mut self, sync: Self::Sync);
}

/// A GPU sync object that has not been exported yet.
#[must_use = "a GpuFence must be exported or discarded through ExplicitSync"]
pub struct GpuFence<S> {
    sync: S,
    frame_index: u64,
}

impl<S> GpuFence<S> {
    /// Frame whose draw work this fence covers.
    #[inline]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl<S> fmt::Debug for GpuFence<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuFence")
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

/// Proof that the GPU supports native fence export, and the factory for
/// acquire fences.
///
/// Only [`probe`](Self::probe) constructs one, so holding an `ExplicitSync`
/// means the capability check already passed.
#[derive(Debug)]
pub struct ExplicitSync {
    ledger: FenceLedger,
    exported: u64,
}

impl ExplicitSync {
    /// Checks the capability. Fails with
    /// [`PresentError::CapabilityUnavailable`] when it is missing.
    pub fn probe<B: SyncBackend>(backend: &B, ledger: FenceLedger) -> PresentResult<Self> {
        if !backend.has_native_fence_sync() {
            let capability = backend.capability_name();
            tracing::error!(capability, "explicit sync not supported");
            return Err(PresentError::CapabilityUnavailable { capability });
        }
        Ok(Self {
            ledger,
            exported: 0,
        })
    }

    /// Captures the GPU work issued so far for `frame_index`.
    pub fn create_from_pending_gpu_op<B: SyncBackend>(
        &self,
        backend: &mut B,
        frame_index: u64,
    ) -> PresentResult<GpuFence<B::Sync>> {
        let sync = backend.create_sync()?;
        Ok(GpuFence { sync, frame_index })
    }

    /// Exports `fence` as a tracked native fence owned by the GPU.
    ///
    /// The GPU-local object is destroyed whether or not export succeeds.
    pub fn export_native_handle<B: SyncBackend>(
        &mut self,
        backend: &mut B,
        fence: GpuFence<B::Sync>,
    ) -> PresentResult<NativeFence> {
        let exported = backend.export_sync(&fence.sync);
        backend.destroy_sync(fence.sync);
        let native = NativeFence::new(exported?, FenceOwner::Gpu, &self.ledger);
        self.exported += 1;
        tracing::trace!(
            frame_index = fence.frame_index,
            id = ?native.id(),
            "acquire fence exported"
        );
        Ok(native)
    }

    /// Destroys a fence that will not be exported.
    pub fn discard<B: SyncBackend>(&self, backend: &mut B, fence: GpuFence<B::Sync>) {
        backend.destroy_sync(fence.sync);
    }

    /// Number of acquire fences exported so far.
    #[must_use]
    pub const fn exported(&self) -> u64 {
        self.exported
    }

    /// Ledger exported fences are registered with.
    #[must_use]
    pub const fn ledger(&self) -> &FenceLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGpu;

    #[test]
    fn probe_rejects_missing_capability() {
        let gpu = FakeGpu::new().without_native_fence_sync();
        let err = ExplicitSync::probe(&gpu, FenceLedger::new()).unwrap_err();
        assert!(
            matches!(err, PresentError::CapabilityUnavailable { .. }),
            "expected capability error, got {err:?}"
        );
    }

    #[test]
    fn export_destroys_gpu_object() {
        let mut gpu = FakeGpu::new();
        let ledger = FenceLedger::new();
        let mut sync = ExplicitSync::probe(&gpu, ledger.clone()).expect("probe");

        let pending = sync
            .create_from_pending_gpu_op(&mut gpu, 7)
            .expect("create");
        assert_eq!(pending.frame_index(), 7);
        let fence = sync.export_native_handle(&mut gpu, pending).expect("export");

        assert_eq!(fence.owner(), FenceOwner::Gpu);
        assert_eq!(gpu.log().live_syncs, 0, "GPU object destroyed after export");
        assert_eq!(sync.exported(), 1);
        assert_eq!(ledger.outstanding(), 1, "native fence is tracked");
    }

    #[test]
    fn failed_export_still_destroys_gpu_object() {
        let mut gpu = FakeGpu::new().failing_export();
        let mut sync = ExplicitSync::probe(&gpu, FenceLedger::new()).expect("probe");
        let pending = sync
            .create_from_pending_gpu_op(&mut gpu, 0)
            .expect("create");
        assert!(sync.export_native_handle(&mut gpu, pending).is_err());
        assert_eq!(gpu.log().live_syncs, 0, "no GPU object leaks on failure");
        assert_eq!(sync.ledger().created(), 0, "nothing was registered");
    }
}
