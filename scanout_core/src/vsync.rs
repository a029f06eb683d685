// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vblank notifications.
//!
//! The compositor delivers vblank events from its own thread through a
//! [`VsyncSender`]. The channel is bounded and sending never blocks: when the
//! loop falls behind, new events are dropped and counted. The loop drains the
//! [`VsyncMonitor`] once per iteration and keeps a frame-rate estimate over
//! one-second windows.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::display::DisplayId;
use crate::time::{HostTime, TickSpan};

/// One vblank on one display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VsyncEvent {
    /// Display that refreshed.
    pub display: DisplayId,
    /// When the vblank happened, on the monotonic clock.
    pub timestamp: HostTime,
}

/// Compositor-side half of the vsync channel.
#[derive(Clone, Debug)]
pub struct VsyncSender {
    tx: Sender<VsyncEvent>,
    dropped: Arc<AtomicU64>,
}

impl VsyncSender {
    /// Queues `event` without blocking. Returns `false` if it was dropped
    /// because the queue is full or the monitor is gone.
    pub fn notify(&self, event: VsyncEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Running vblank frame-rate estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRateCounter {
    window: TickSpan,
    window_start: Option<HostTime>,
    in_window: u64,
    total: u64,
    last_rate: Option<f64>,
}

impl FrameRateCounter {
    /// Creates a counter that reports once per `window`.
    #[must_use]
    pub const fn new(window: TickSpan) -> Self {
        Self {
            window,
            window_start: None,
            in_window: 0,
            total: 0,
            last_rate: None,
        }
    }

    /// Records one vblank. Returns the rate in Hz when a window closes.
    #[expect(
        clippy::cast_precision_loss,
        reason = "vblank counts per window are tiny"
    )]
    pub fn observe(&mut self, timestamp: HostTime) -> Option<f64> {
        self.total += 1;
        let Some(start) = self.window_start else {
            self.window_start = Some(timestamp);
            return None;
        };
        self.in_window += 1;
        let elapsed = timestamp.saturating_since(start);
        if elapsed < self.window {
            return None;
        }
        let rate = self.in_window as f64 / elapsed.as_secs_f64();
        self.window_start = Some(timestamp);
        self.in_window = 0;
        self.last_rate = Some(rate);
        Some(rate)
    }

    /// Rate reported by the most recently closed window.
    #[must_use]
    pub const fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }

    /// Vblanks observed in total.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }
}

/// Loop-side half of the vsync channel.
#[derive(Debug)]
pub struct VsyncMonitor {
    rx: Receiver<VsyncEvent>,
    dropped: Arc<AtomicU64>,
    reported_dropped: u64,
    rate: FrameRateCounter,
    last: Option<VsyncEvent>,
}

impl VsyncMonitor {
    /// Creates a channel holding at most `capacity` undelivered events.
    #[must_use]
    pub fn channel(capacity: usize) -> (VsyncSender, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            VsyncSender {
                tx,
                dropped: Arc::clone(&dropped),
            },
            Self {
                rx,
                dropped,
                reported_dropped: 0,
                rate: FrameRateCounter::new(TickSpan(1_000_000_000)),
                last: None,
            },
        )
    }

    /// Consumes every queued event in delivery order, calling `on_event` for
    /// each. Returns how many were consumed.
    pub fn drain(&mut self, mut on_event: impl FnMut(&VsyncEvent)) -> usize {
        let mut consumed = 0;
        while let Ok(event) = self.rx.try_recv() {
            if let Some(rate) = self.rate.observe(event.timestamp) {
                tracing::info!(display = ?event.display, rate_hz = rate, "vsync rate");
            }
            on_event(&event);
            self.last = Some(event);
            consumed += 1;
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_dropped {
            tracing::warn!(
                dropped = dropped - self.reported_dropped,
                "vsync events dropped, loop is falling behind"
            );
            self.reported_dropped = dropped;
        }
        consumed
    }

    /// Events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Most recent event consumed.
    #[must_use]
    pub const fn last(&self) -> Option<VsyncEvent> {
        self.last
    }

    /// Frame-rate counter.
    #[must_use]
    pub const fn rate(&self) -> &FrameRateCounter {
        &self.rate
    }
}
