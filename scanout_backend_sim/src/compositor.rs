// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated display compositor.
//!
//! A vblank thread ticks at the active mode's refresh rate. On each tick it
//! latches the oldest queued flip if its acquire fence has signaled, signals
//! the release fence of the buffer that flip replaces, and notifies the vsync
//! channel. At most one flip latches per vblank.
//!
//! ```text
//!  submit(B) ──► queue ──(acquire signaled, vblank)──► front
//!                  │                                    │
//!  FlipMode::Mailbox: submit(C) before       replaced: release(A)
//!  B latched skips B, release(B) at once
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{fmt, io};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use scanout_core::backend::{Compositor, Rejection};
use scanout_core::buffer::{BufferId, FrameBuffer, PixelFormat};
use scanout_core::display::{DisplayConfig, DisplayId, LayerId};
use scanout_core::fence::{NativeFence, NativeSync};
use scanout_core::time::{HostTime, now};
use scanout_core::vsync::{VsyncEvent, VsyncSender};
use scanout_core::{PresentError, PresentResult};

use crate::allocator::SimSurface;
use crate::signal::{Signaler, fence_pipe};

/// One latched flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scanout {
    /// Buffer put on screen.
    pub buffer: BufferId,
    /// Frame the buffer held when latched.
    pub frame_index: Option<u64>,
    /// Vblank count at latch time.
    pub vblank: u64,
    /// When the flip was latched.
    pub timestamp: HostTime,
}

/// Compositor counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayStats {
    /// Vblanks ticked.
    pub vblanks: u64,
    /// Submissions accepted.
    pub submissions: u64,
    /// Submissions rejected.
    pub rejections: u64,
    /// Flips latched.
    pub flips: u64,
    /// Submissions replaced before they were latched.
    pub skipped: u64,
}

/// What a submission does to flips that have not latched yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlipMode {
    /// Queue behind them; every submission reaches the screen.
    #[default]
    Fifo,
    /// Replace them and release their buffers at once.
    Mailbox,
}

struct Flip {
    buffer: BufferId,
    surface: SimSurface,
    acquire: Option<NativeFence>,
    release: Signaler,
}

#[derive(Default)]
struct DisplayState {
    layer: Option<LayerId>,
    mode: FlipMode,
    queue: VecDeque<Flip>,
    front: Option<Flip>,
    vsync: Option<VsyncSender>,
    scanouts: Vec<Scanout>,
    stats: DisplayStats,
}

impl DisplayState {
    fn vblank(&mut self, display: DisplayId) {
        self.stats.vblanks += 1;
        let timestamp = now();

        let ready = match self.queue.front_mut().map(|flip| flip.acquire.as_mut()) {
            Some(Some(acquire)) => match acquire.poll() {
                Ok(ready) => ready,
                Err(err) => {
                    tracing::warn!(error = %err, "acquire fence failed, dropping flip");
                    if let Some(mut flip) = self.queue.pop_front() {
                        flip.release.signal_or_warn("failed flip release");
                    }
                    false
                }
            },
            Some(None) => true,
            None => false,
        };

        if ready && let Some(mut flip) = self.queue.pop_front() {
            if let Some(acquire) = flip.acquire.take() {
                acquire.dispose();
            }
            self.scanouts.push(Scanout {
                buffer: flip.buffer,
                frame_index: flip.surface.contents(),
                vblank: self.stats.vblanks,
                timestamp,
            });
            self.stats.flips += 1;
            tracing::trace!(buffer = ?flip.buffer, vblank = self.stats.vblanks, "flip latched");
            if let Some(mut old) = self.front.replace(flip) {
                old.release.signal_or_warn("release");
            }
        }

        if let Some(tx) = &self.vsync {
            tx.notify(VsyncEvent { display, timestamp });
        }
    }

    fn enqueue(&mut self, flip: Flip) {
        if self.mode == FlipMode::Mailbox {
            while let Some(mut skipped) = self.queue.pop_front() {
                tracing::debug!(buffer = ?skipped.buffer, "flip replaced before latch");
                if let Some(acquire) = skipped.acquire.take() {
                    acquire.dispose();
                }
                skipped.release.signal_or_warn("skipped flip release");
                self.stats.skipped += 1;
            }
        }
        self.queue.push_back(flip);
        self.stats.submissions += 1;
    }

    /// Takes every buffer off the display. History and counters stay
    /// readable through monitors.
    fn power_off(&mut self) {
        let queued = self.queue.drain(..).collect::<Vec<_>>();
        for mut flip in queued.into_iter().chain(self.front.take()) {
            if let Some(acquire) = flip.acquire.take() {
                acquire.dispose();
            }
            flip.release.signal_or_warn("power-off release");
        }
        self.vsync = None;
        self.layer = None;
    }
}

/// Read-only view of a [`SimCompositor`], usable after the compositor has
/// been handed to a presentation loop.
#[derive(Clone)]
pub struct DisplayMonitor {
    state: Arc<Mutex<DisplayState>>,
}

impl DisplayMonitor {
    /// Flips latched so far, oldest first.
    #[must_use]
    pub fn scanouts(&self) -> Vec<Scanout> {
        self.state.lock().scanouts.clone()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> DisplayStats {
        self.state.lock().stats
    }

    /// Buffer currently on screen.
    #[must_use]
    pub fn on_screen(&self) -> Option<BufferId> {
        self.state.lock().front.as_ref().map(|flip| flip.buffer)
    }
}

impl fmt::Debug for DisplayMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayMonitor")
            .field("stats", &self.stats())
            .field("on_screen", &self.on_screen())
            .finish_non_exhaustive()
    }
}

/// A single-display compositor with a single layer.
pub struct SimCompositor {
    display: DisplayId,
    modes: Vec<DisplayConfig>,
    active_mode: u32,
    formats: Vec<PixelFormat>,
    state: Arc<Mutex<DisplayState>>,
    stop: Option<Sender<()>>,
    vblank: Option<JoinHandle<()>>,
}

impl SimCompositor {
    /// Starts the vblank thread for `display`, ticking at the refresh rate of
    /// the mode in `modes` whose id is `active_mode`.
    pub fn new(
        display_id: DisplayId,
        modes: Vec<DisplayConfig>,
        active_mode: u32,
        formats: Vec<PixelFormat>,
    ) -> io::Result<Self> {
        let interval = modes
            .iter()
            .find(|mode| mode.id == active_mode)
            .and_then(DisplayConfig::refresh_interval)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("mode {active_mode} missing or has no refresh rate"),
                )
            })?;
        let state = Arc::new(Mutex::new(DisplayState::default()));
        let (stop_tx, stop_rx) = bounded(1);
        let ticker_state = Arc::clone(&state);
        let vblank = thread::Builder::new()
            .name("sim-vblank".into())
            .spawn(move || tick(&stop_rx, interval, display_id, &ticker_state))?;
        tracing::debug!(?display_id, ?interval, "sim display started");
        Ok(Self {
            display: display_id,
            modes,
            active_mode,
            formats,
            state,
            stop: Some(stop_tx),
            vblank: Some(vblank),
        })
    }

    /// Sets how submissions treat flips that have not latched yet.
    #[must_use]
    pub fn with_flip_mode(self, mode: FlipMode) -> Self {
        self.state.lock().mode = mode;
        self
    }

    /// A view that stays valid after `self` moves into a loop.
    #[must_use]
    pub fn monitor(&self) -> DisplayMonitor {
        DisplayMonitor {
            state: Arc::clone(&self.state),
        }
    }
}

fn tick(
    stop: &Receiver<()>,
    interval: Duration,
    display_id: DisplayId,
    state: &Mutex<DisplayState>,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => state.lock().vblank(display_id),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(?display_id, "sim vblank thread exiting");
}

impl Compositor<SimSurface> for SimCompositor {
    fn create_layer(&mut self, display: DisplayId, z_order: u32) -> PresentResult<LayerId> {
        if display != self.display {
            return Err(PresentError::invalid_config(format!(
                "no display {display:?}"
            )));
        }
        let mut state = self.state.lock();
        if state.layer.is_some() {
            return Err(PresentError::CapabilityUnavailable {
                capability: "multiple layers",
            });
        }
        let id = LayerId(u64::from(z_order) + 1);
        state.layer = Some(id);
        Ok(id)
    }

    fn submit(
        &mut self,
        layer: LayerId,
        buffer: &FrameBuffer<SimSurface>,
        acquire: NativeFence,
    ) -> Result<Option<Box<dyn NativeSync>>, Rejection> {
        let mut state = self.state.lock();
        if state.layer != Some(layer) {
            state.stats.rejections += 1;
            acquire.dispose();
            return Err(Rejection::new(format!("unknown layer {layer:?}")));
        }
        let format = buffer.desc().format;
        if !self.formats.contains(&format) {
            state.stats.rejections += 1;
            acquire.dispose();
            return Err(Rejection::new(format!("format {format:?} cannot be scanned out")));
        }
        let (fence, release) = match fence_pipe() {
            Ok(pair) => pair,
            Err(err) => {
                acquire.dispose();
                return Err(Rejection::new(format!("release fence: {err}")));
            }
        };

        let flip = Flip {
            buffer: buffer.id(),
            surface: buffer.handle().clone(),
            acquire: Some(acquire),
            release,
        };
        state.enqueue(flip);
        Ok(Some(Box::new(fence)))
    }

    fn register_vsync(&mut self, display: DisplayId, sender: VsyncSender) -> PresentResult<()> {
        if display != self.display {
            return Err(PresentError::invalid_config(format!(
                "no display {display:?}"
            )));
        }
        self.state.lock().vsync = Some(sender);
        Ok(())
    }

    fn display_configs(&self, display: DisplayId) -> Vec<DisplayConfig> {
        if display == self.display {
            self.modes.clone()
        } else {
            Vec::new()
        }
    }

    fn active_config(&self, display: DisplayId) -> Option<u32> {
        (display == self.display).then_some(self.active_mode)
    }
}

impl Drop for SimCompositor {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(vblank) = self.vblank.take()
            && vblank.join().is_err()
        {
            tracing::error!("sim vblank thread panicked");
        }
        self.state.lock().power_off();
    }
}

impl fmt::Debug for SimCompositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimCompositor")
            .field("display", &self.display)
            .field("modes", &self.modes)
            .field("active_mode", &self.active_mode)
            .field("formats", &self.formats)
            .field("state", &self.monitor())
            .field("stop", &self.stop.is_some())
            .field("vblank", &self.vblank.is_some())
            .finish()
    }
}
