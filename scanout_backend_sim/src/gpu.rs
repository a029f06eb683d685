// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated GPU.
//!
//! Drawing is instantaneous on the calling thread; completion is not. Every
//! sync object created after a draw is queued on [`flush`] to a worker thread,
//! which signals its pipe fence once the configured render latency has passed.
//! Jobs complete in submission order, like a single GPU queue.
//!
//! [`flush`]: scanout_core::backend::Renderer::flush

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::{fmt, io};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use scanout_core::backend::Renderer;
use scanout_core::buffer::FrameBuffer;
use scanout_core::fence::{NativeSync, SyncBackend, SyncFile};
use scanout_core::{PresentError, PresentResult};

use crate::allocator::SimSurface;
use crate::signal::{Signaler, fence_pipe};

/// GPU counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuStats {
    /// Draw calls recorded.
    pub draws: u64,
    /// Sync objects created.
    pub syncs_created: u64,
    /// Sync objects destroyed.
    pub syncs_destroyed: u64,
    /// Fences the worker has signaled.
    pub fences_signaled: u64,
}

/// GPU-side sync object: the fence a flushed job will signal.
#[derive(Debug)]
pub struct SimSync {
    fence: SyncFile,
}

struct Job {
    signaler: Signaler,
    ready_at: Instant,
}

/// Renderer and explicit-sync provider backed by a worker thread.
pub struct SimGpu {
    latency: Duration,
    native_fence_sync: bool,
    last_frame: u64,
    unflushed: Vec<Job>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<GpuStats>>,
}

impl SimGpu {
    /// Starts the GPU worker. Each frame completes `latency` after it is
    /// flushed.
    pub fn new(latency: Duration) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let stats = Arc::new(Mutex::new(GpuStats::default()));
        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name("sim-gpu".into())
            .spawn(move || complete_jobs(&rx, &worker_stats))?;
        Ok(Self {
            latency,
            native_fence_sync: true,
            last_frame: 0,
            unflushed: Vec::new(),
            jobs: Some(tx),
            worker: Some(worker),
            stats,
        })
    }

    /// Pretends the driver lacks native fence sync.
    #[must_use]
    pub fn without_native_fence_sync(mut self) -> Self {
        self.native_fence_sync = false;
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> GpuStats {
        *self.stats.lock()
    }
}

fn complete_jobs(jobs: &Receiver<Job>, stats: &Mutex<GpuStats>) {
    for mut job in jobs {
        let now = Instant::now();
        if job.ready_at > now {
            thread::sleep(job.ready_at - now);
        }
        job.signaler.signal_or_warn("gpu completion");
        stats.lock().fences_signaled += 1;
    }
    tracing::debug!("sim GPU worker exiting");
}

impl Renderer<SimSurface> for SimGpu {
    fn draw(&mut self, frame_index: u64, target: &FrameBuffer<SimSurface>) -> PresentResult<()> {
        target.handle().stamp(frame_index);
        self.last_frame = frame_index;
        self.stats.lock().draws += 1;
        tracing::trace!(frame_index, buffer = ?target.id(), "draw recorded");
        Ok(())
    }

    fn flush(&mut self) -> PresentResult<()> {
        let Some(jobs) = &self.jobs else {
            return Err(PresentError::render(self.last_frame, "GPU worker stopped"));
        };
        for job in self.unflushed.drain(..) {
            jobs.send(job)
                .map_err(|_| PresentError::render(self.last_frame, "GPU worker exited"))?;
        }
        Ok(())
    }
}

impl SyncBackend for SimGpu {
    type Sync = SimSync;

    fn has_native_fence_sync(&self) -> bool {
        self.native_fence_sync
    }

    fn capability_name(&self) -> &'static str {
        "EGL_ANDROID_native_fence_sync"
    }

    fn create_sync(&mut self) -> PresentResult<SimSync> {
        let (fence, signaler) = fence_pipe()
            .map_err(|err| PresentError::render(self.last_frame, format!("fence pipe: {err}")))?;
        self.unflushed.push(Job {
            signaler,
            ready_at: Instant::now() + self.latency,
        });
        self.stats.lock().syncs_created += 1;
        Ok(SimSync { fence })
    }

    fn export_sync(&mut self, sync: &SimSync) -> PresentResult<Box<dyn NativeSync>> {
        let fence = sync
            .fence
            .try_clone()
            .map_err(|err| PresentError::render(self.last_frame, format!("dup fence: {err}")))?;
        Ok(Box::new(fence))
    }

    fn destroy_sync(&mut self, sync: SimSync) {
        drop(sync);
        self.stats.lock().syncs_destroyed += 1;
    }
}

impl Drop for SimGpu {
    fn drop(&mut self) {
        self.unflushed.clear();
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("sim GPU worker panicked");
        }
    }
}

impl fmt::Debug for SimGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimGpu")
            .field("latency", &self.latency)
            .field("native_fence_sync", &self.native_fence_sync)
            .field("last_frame", &self.last_frame)
            .field("unflushed", &self.unflushed.len())
            .field("running", &self.jobs.is_some())
            .field("worker", &self.worker.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use scanout_core::backend::BufferAllocator;
    use scanout_core::buffer::{BufferDesc, BufferId};
    use scanout_core::fence::{ExplicitSync, FenceLedger};

    use super::*;
    use crate::allocator::SimAllocator;

    fn target() -> FrameBuffer<SimSurface> {
        let desc = BufferDesc::default();
        let surface = SimAllocator::new(u64::MAX)
            .allocate(BufferId(0), &desc)
            .expect("alloc");
        FrameBuffer::new(BufferId(0), desc, surface)
    }

    #[test]
    fn fence_signals_after_latency() {
        let mut gpu = SimGpu::new(Duration::from_millis(20)).expect("gpu");
        let ledger = FenceLedger::new();
        let mut sync = ExplicitSync::probe(&gpu, ledger.clone()).expect("probe");
        let buffer = target();

        gpu.draw(4, &buffer).expect("draw");
        let pending = sync.create_from_pending_gpu_op(&mut gpu, 4).expect("create");
        gpu.flush().expect("flush");
        let mut fence = sync.export_native_handle(&mut gpu, pending).expect("export");

        assert!(!fence.poll().expect("poll"), "pending right after flush");
        fence.wait(Duration::from_secs(1)).expect("signals");
        assert_eq!(buffer.handle().contents(), Some(4));
        let stats = gpu.stats();
        assert_eq!(stats.syncs_created, stats.syncs_destroyed, "GPU objects freed");
        assert_eq!(stats.fences_signaled, 1);
    }

    #[test]
    fn jobs_complete_in_order() {
        let mut gpu = SimGpu::new(Duration::from_millis(5)).expect("gpu");
        let first = gpu.create_sync().expect("first");
        let second = gpu.create_sync().expect("second");
        gpu.flush().expect("flush");
        let second_fence = gpu.export_sync(&second).expect("export");
        assert!(second_fence.wait(Duration::from_secs(1)).expect("wait"));
        let first_fence = gpu.export_sync(&first).expect("export");
        assert!(
            first_fence.wait(Duration::ZERO).expect("poll"),
            "earlier job completed first"
        );
        gpu.destroy_sync(first);
        gpu.destroy_sync(second);
    }

    #[test]
    fn missing_capability_is_reported() {
        let gpu = SimGpu::new(Duration::ZERO)
            .expect("gpu")
            .without_native_fence_sync();
        assert!(
            ExplicitSync::probe(&gpu, FenceLedger::new()).is_err(),
            "probe fails without the extension"
        );
    }
}
