// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated backend for `scanout_core`.
//!
//! This crate provides in-process stand-ins for the three platform
//! collaborators of a [`PresentLoop`](scanout_core::pipeline::PresentLoop):
//!
//! - [`SimAllocator`]: surfaces with no pixel storage
//! - [`SimGpu`]: a renderer whose fences signal from a worker thread after a
//!   configurable latency
//! - [`SimCompositor`]: one display with one layer, latching flips on a
//!   vblank thread and signaling release fences when buffers leave the screen
//!
//! Every fence is a real file descriptor (the read end of a pipe), so the
//! loop's `poll(2)`-based waits run unmodified against it.

mod allocator;
mod compositor;
mod gpu;
mod signal;

use std::io;
use std::time::Duration;

use scanout_core::buffer::PixelFormat;
use scanout_core::display::{DisplayConfig, DisplayId};
use scanout_core::pipeline::PresentContext;

pub use allocator::{AllocatorStats, SimAllocator, SimSurface};
pub use compositor::{DisplayMonitor, DisplayStats, FlipMode, Scanout, SimCompositor};
pub use gpu::{GpuStats, SimGpu, SimSync};

/// Shape of a simulated machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// Display the compositor drives.
    pub display: DisplayId,
    /// Modes the display reports.
    pub modes: Vec<DisplayConfig>,
    /// Id of the mode the vblank thread ticks at.
    pub active_mode: u32,
    /// Formats the compositor accepts for scanout.
    pub formats: Vec<PixelFormat>,
    /// How submissions treat flips that have not latched yet.
    pub flip_mode: FlipMode,
    /// Time from flush to GPU fence signal.
    pub render_latency: Duration,
    /// Largest surface the allocator hands out.
    pub max_buffer_bytes: u64,
    /// Whether the GPU advertises native fence sync.
    pub native_fence_sync: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            display: DisplayId::PRIMARY,
            modes: vec![
                DisplayConfig {
                    id: 0,
                    width: 1920,
                    height: 1080,
                    refresh_mhz: 60_000,
                    dpi_x: 160,
                    dpi_y: 160,
                },
                DisplayConfig {
                    id: 1,
                    width: 1280,
                    height: 720,
                    refresh_mhz: 60_000,
                    dpi_x: 160,
                    dpi_y: 160,
                },
            ],
            active_mode: 0,
            formats: vec![PixelFormat::XRGB8888, PixelFormat::ARGB8888],
            flip_mode: FlipMode::Fifo,
            render_latency: Duration::from_millis(4),
            max_buffer_bytes: 64 << 20,
            native_fence_sync: true,
        }
    }
}

/// The collaborators a simulated loop runs against.
pub type SimContext = PresentContext<SimAllocator, SimGpu, SimCompositor>;

/// Starts the GPU and display threads described by `config`.
pub fn context(config: &SimConfig) -> io::Result<SimContext> {
    let mut gpu = SimGpu::new(config.render_latency)?;
    if !config.native_fence_sync {
        gpu = gpu.without_native_fence_sync();
    }
    let compositor = SimCompositor::new(
        config.display,
        config.modes.clone(),
        config.active_mode,
        config.formats.clone(),
    )?
    .with_flip_mode(config.flip_mode);
    Ok(PresentContext {
        allocator: SimAllocator::new(config.max_buffer_bytes),
        gpu,
        compositor,
        display: config.display,
    })
}
