// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scriptable fakes for unit tests.
//!
//! Fences created here only change state when a test (or a fake
//! collaborator acting for the test) triggers them.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{BufferAllocator, Compositor, Rejection, Renderer};
use crate::buffer::{BufferDesc, BufferId, FrameBuffer};
use crate::cancel::CancelToken;
use crate::display::{DisplayConfig, DisplayId, LayerId};
use crate::fence::{FenceId, NativeFence, NativeSync, SyncBackend};
use crate::time::HostTime;
use crate::vsync::{VsyncEvent, VsyncSender};
use crate::{PresentError, PresentResult};

// ---------------------------------------------------------------------------
// Fences
// ---------------------------------------------------------------------------

const SIGNALED: u8 = 1;
const FAILED: u8 = 2;

// A default cell is pending.
#[derive(Debug, Default)]
struct FenceCell {
    state: AtomicU8,
    waits: AtomicU64,
}

/// A fence that signals only when its [`FenceTrigger`] says so.
#[derive(Debug)]
pub(crate) struct ManualFence {
    cell: Arc<FenceCell>,
}

/// Test-side control of a [`ManualFence`].
#[derive(Clone, Debug)]
pub(crate) struct FenceTrigger {
    cell: Arc<FenceCell>,
}

impl ManualFence {
    pub(crate) fn pending() -> (Self, FenceTrigger) {
        let cell = Arc::new(FenceCell::default());
        (
            Self {
                cell: Arc::clone(&cell),
            },
            FenceTrigger { cell },
        )
    }

    pub(crate) fn signaled() -> Self {
        let (fence, trigger) = Self::pending();
        trigger.signal();
        fence
    }

    fn read(&self) -> io::Result<bool> {
        match self.cell.state.load(Ordering::Acquire) {
            SIGNALED => Ok(true),
            FAILED => Err(io::Error::other("fence entered error state")),
            _ => Ok(false),
        }
    }
}

impl NativeSync for ManualFence {
    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        self.cell.waits.fetch_add(1, Ordering::AcqRel);
        if self.read()? || timeout.is_zero() {
            return self.read();
        }
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
        self.read()
    }
}

impl FenceTrigger {
    pub(crate) fn signal(&self) {
        self.cell.state.store(SIGNALED, Ordering::Release);
    }

    pub(crate) fn fail(&self) {
        self.cell.state.store(FAILED, Ordering::Release);
    }

    pub(crate) fn wait_calls(&self) -> u64 {
        self.cell.waits.load(Ordering::Acquire)
    }

    fn fence(&self) -> ManualFence {
        ManualFence {
            cell: Arc::clone(&self.cell),
        }
    }
}

// ---------------------------------------------------------------------------
// GPU
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub(crate) struct GpuLog {
    pub(crate) draws: Vec<(u64, BufferId)>,
    pub(crate) live_syncs: usize,
}

/// Renderer and sync backend whose fences signal immediately.
#[derive(Debug)]
pub(crate) struct FakeGpu {
    log: Arc<Mutex<GpuLog>>,
    native_sync: bool,
    fail_export: bool,
    fail_draw_at: Option<u64>,
    fail_flush_at: Option<u64>,
    last_frame: u64,
}

impl FakeGpu {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::default(),
            native_sync: true,
            fail_export: false,
            fail_draw_at: None,
            fail_flush_at: None,
            last_frame: 0,
        }
    }

    pub(crate) fn without_native_fence_sync(mut self) -> Self {
        self.native_sync = false;
        self
    }

    pub(crate) fn failing_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    pub(crate) fn failing_draw_at(mut self, frame_index: u64) -> Self {
        self.fail_draw_at = Some(frame_index);
        self
    }

    pub(crate) fn failing_flush_at(mut self, frame_index: u64) -> Self {
        self.fail_flush_at = Some(frame_index);
        self
    }

    pub(crate) fn log(&self) -> GpuLog {
        self.log.lock().clone()
    }
}

impl<H> Renderer<H> for FakeGpu {
    fn draw(&mut self, frame_index: u64, target: &FrameBuffer<H>) -> PresentResult<()> {
        if self.fail_draw_at == Some(frame_index) {
            return Err(PresentError::render(frame_index, "device lost"));
        }
        self.last_frame = frame_index;
        self.log.lock().draws.push((frame_index, target.id()));
        Ok(())
    }

    fn flush(&mut self) -> PresentResult<()> {
        if self.fail_flush_at == Some(self.last_frame) {
            return Err(PresentError::render(self.last_frame, "out of memory"));
        }
        Ok(())
    }
}

impl SyncBackend for FakeGpu {
    type Sync = FenceTrigger;

    fn has_native_fence_sync(&self) -> bool {
        self.native_sync
    }

    fn capability_name(&self) -> &'static str {
        "EGL_ANDROID_native_fence_sync"
    }

    fn create_sync(&mut self) -> PresentResult<FenceTrigger> {
        let (_fence, trigger) = ManualFence::pending();
        trigger.signal();
        self.log.lock().live_syncs += 1;
        Ok(trigger)
    }

    fn export_sync(&mut self, sync: &FenceTrigger) -> PresentResult<Box<dyn NativeSync>> {
        if self.fail_export {
            return Err(PresentError::render(self.last_frame, "sync export failed"));
        }
        Ok(Box::new(sync.fence()))
    }

    fn destroy_sync(&mut self, _sync: FenceTrigger) {
        self.log.lock().live_syncs -= 1;
    }
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Hands out sequential integer handles.
#[derive(Debug, Default)]
pub(crate) struct FakeAllocator {
    next: u32,
    allocations: usize,
    destroyed: usize,
}

impl FakeAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocations(&self) -> usize {
        self.allocations
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.destroyed
    }
}

impl BufferAllocator for FakeAllocator {
    type Handle = u32;

    fn allocate(&mut self, id: BufferId, desc: &BufferDesc) -> PresentResult<u32> {
        if desc.width == 0 || desc.height == 0 {
            return Err(PresentError::allocation(id, "empty buffer"));
        }
        self.next += 1;
        self.allocations += 1;
        Ok(self.next)
    }

    fn destroy(&mut self, _handle: u32) {
        self.destroyed += 1;
    }
}

// ---------------------------------------------------------------------------
// Compositor
// ---------------------------------------------------------------------------

/// How the fake compositor answers submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReleasePolicy {
    /// Signal the previous buffer's release fence when a new one arrives.
    OnSupersede,
    /// Return release fences that only tests signal.
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Submission {
    pub(crate) buffer: BufferId,
    pub(crate) acquire: FenceId,
}

#[derive(Debug, Default)]
pub(crate) struct DisplayLog {
    pub(crate) layers: Vec<(DisplayId, u32)>,
    pub(crate) submissions: Vec<Submission>,
    pub(crate) releases: Vec<(BufferId, FenceTrigger)>,
    pub(crate) vsync: Option<VsyncSender>,
}

impl DisplayLog {
    /// Trigger of the `nth` release fence handed out for `buffer`.
    pub(crate) fn release_trigger(&self, buffer: BufferId, nth: usize) -> FenceTrigger {
        self.releases
            .iter()
            .filter(|(b, _)| *b == buffer)
            .nth(nth)
            .map(|(_, t)| t.clone())
            .expect("no such release fence")
    }
}

/// Records submissions and scripts release fences, rejections and
/// cancellation.
#[derive(Debug)]
pub(crate) struct FakeCompositor {
    log: Arc<Mutex<DisplayLog>>,
    policy: ReleasePolicy,
    reject_at: Option<usize>,
    cancel_after: Option<(usize, CancelToken)>,
    front: Option<FenceTrigger>,
    attempts: usize,
}

impl FakeCompositor {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::default(),
            policy: ReleasePolicy::OnSupersede,
            reject_at: None,
            cancel_after: None,
            front: None,
            attempts: 0,
        }
    }

    pub(crate) fn with_policy(mut self, policy: ReleasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rejects the submission attempt with zero-based index `attempt`.
    pub(crate) fn rejecting_at(mut self, attempt: usize) -> Self {
        self.reject_at = Some(attempt);
        self
    }

    /// Cancels `token` right after accepting attempt `attempt`.
    pub(crate) fn cancelling_after(mut self, attempt: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((attempt, token));
        self
    }

    pub(crate) fn log_handle(&self) -> Arc<Mutex<DisplayLog>> {
        Arc::clone(&self.log)
    }
}

impl<H> Compositor<H> for FakeCompositor {
    fn create_layer(&mut self, display: DisplayId, z_order: u32) -> PresentResult<LayerId> {
        let mut log = self.log.lock();
        log.layers.push((display, z_order));
        Ok(LayerId(log.layers.len() as u64))
    }

    fn submit(
        &mut self,
        _layer: LayerId,
        buffer: &FrameBuffer<H>,
        acquire: NativeFence,
    ) -> Result<Option<Box<dyn NativeSync>>, Rejection> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.reject_at == Some(attempt) {
            acquire.dispose();
            return Err(Rejection::new("unsupported buffer layout"));
        }

        let mut log = self.log.lock();
        log.submissions.push(Submission {
            buffer: buffer.id(),
            acquire: acquire.id(),
        });
        acquire.dispose();

        let (fence, trigger) = ManualFence::pending();
        if self.policy == ReleasePolicy::OnSupersede
            && let Some(previous) = self.front.replace(trigger.clone())
        {
            previous.signal();
        }
        log.releases.push((buffer.id(), trigger));
        if let Some(tx) = &log.vsync {
            tx.notify(VsyncEvent {
                display: DisplayId::PRIMARY,
                timestamp: HostTime(attempt as u64 * 16_666_667),
            });
        }
        if let Some((n, token)) = &self.cancel_after
            && *n == attempt
        {
            token.cancel();
        }
        Ok(Some(Box::new(fence)))
    }

    fn register_vsync(&mut self, _display: DisplayId, sender: VsyncSender) -> PresentResult<()> {
        self.log.lock().vsync = Some(sender);
        Ok(())
    }

    fn display_configs(&self, _display: DisplayId) -> Vec<DisplayConfig> {
        vec![DisplayConfig {
            id: 0,
            width: 1920,
            height: 1080,
            refresh_mhz: 60_000,
            dpi_x: 96,
            dpi_y: 96,
        }]
    }

    fn active_config(&self, _display: DisplayId) -> Option<u32> {
        Some(0)
    }
}
