// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The fence primitive.
//!
//! A fence is a one-shot synchronization object: it starts pending and
//! transitions exactly once, to signaled or to error. Fences cross three
//! boundaries in this crate:
//!
//! - the GPU produces **acquire** fences ([`FenceOwner::Gpu`]) that signal
//!   when rendering into a buffer completes;
//! - the compositor produces **release** fences ([`FenceOwner::Display`]) that
//!   signal when the display stops reading a buffer;
//! - both travel as [`NativeFence`], a tracked wrapper around a
//!   [`NativeSync`] object (a kernel `sync_file` in production, see
//!   [`SyncFile`]).
//!
//! # Disposal
//!
//! Every [`NativeFence`] is registered with a [`FenceLedger`] when created and
//! disposed exactly once: by [`NativeFence::dispose`], by being handed to a
//! consumer that takes ownership, or by being dropped on an early exit.
//! Ownership makes double disposal impossible; the ledger makes leaks
//! observable.
//!
//! # Waiting
//!
//! [`NativeFence::wait`] is always bounded. Unbounded or cancellable waits go
//! through a [`FenceWaiter`], which slices the wait and checks a
//! [`CancelToken`](crate::cancel::CancelToken) between slices.

mod explicit;
mod sync_file;
mod wait;

pub use explicit::{ExplicitSync, GpuFence, SyncBackend};
pub use sync_file::SyncFile;
pub use wait::FenceWaiter;

use core::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{PresentError, PresentResult};

/// A platform synchronization object that can be waited on.
///
/// Implementations report `Ok(true)` once signaled, `Ok(false)` if `timeout`
/// elapsed first, and `Err` when the object is in an error state. A zero
/// timeout is a non-blocking poll.
pub trait NativeSync: fmt::Debug + Send {
    /// Blocks for at most `timeout` waiting for the object to signal.
    fn wait(&self, timeout: Duration) -> io::Result<bool>;
}

/// Identifies a fence within one [`FenceLedger`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceId(pub u64);

impl fmt::Debug for FenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FenceId({})", self.0)
    }
}

/// The party responsible for signaling a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceOwner {
    /// Signals when GPU work completes (acquire fence).
    Gpu,
    /// Signals when the display releases a buffer (release fence).
    Display,
}

/// Observed state of a fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceState {
    /// Not yet signaled.
    Pending,
    /// Signaled. Terminal.
    Signaled,
    /// The underlying object reported an error. Terminal.
    Error,
}

#[derive(Debug, Default)]
struct LedgerCounts {
    created: AtomicU64,
    disposed: AtomicU64,
    dropped_pending: AtomicU64,
}

/// Shared creation and disposal counters for fences.
///
/// Clones observe the same counters. Fence ids are assigned from the creation
/// counter, so ids are unique per ledger.
#[derive(Clone, Debug, Default)]
pub struct FenceLedger {
    counts: Arc<LedgerCounts>,
}

impl FenceLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_created(&self) -> FenceId {
        FenceId(self.counts.created.fetch_add(1, Ordering::AcqRel))
    }

    fn record_disposed(&self, dropped_pending: bool) {
        self.counts.disposed.fetch_add(1, Ordering::AcqRel);
        if dropped_pending {
            self.counts.dropped_pending.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Number of fences created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.counts.created.load(Ordering::Acquire)
    }

    /// Number of fences disposed so far.
    #[must_use]
    pub fn disposed(&self) -> u64 {
        self.counts.disposed.load(Ordering::Acquire)
    }

    /// Fences created but not yet disposed.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.created().saturating_sub(self.disposed())
    }

    /// Disposals that happened by dropping a fence still pending, rather
    /// than through [`NativeFence::dispose`]. Included in
    /// [`disposed`](Self::disposed).
    #[must_use]
    pub fn dropped_pending(&self) -> u64 {
        self.counts.dropped_pending.load(Ordering::Acquire)
    }
}

/// A tracked, owned fence.
///
/// Dropping a `NativeFence` disposes it; dropping one that is still pending
/// is logged and counted in [`FenceLedger::dropped_pending`]. Once a wait or poll has observed
/// [`FenceState::Signaled`], further waits return immediately without touching
/// the native object.
pub struct NativeFence {
    id: FenceId,
    owner: FenceOwner,
    state: FenceState,
    sync: Option<Box<dyn NativeSync>>,
    ledger: FenceLedger,
}

impl NativeFence {
    /// Takes ownership of `sync` and registers it with `ledger`.
    #[must_use]
    pub fn new(sync: Box<dyn NativeSync>, owner: FenceOwner, ledger: &FenceLedger) -> Self {
        let id = ledger.record_created();
        tracing::trace!(?id, ?owner, "fence created");
        Self {
            id,
            owner,
            state: FenceState::Pending,
            sync: Some(sync),
            ledger: ledger.clone(),
        }
    }

    /// Ledger-assigned id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> FenceId {
        self.id
    }

    /// Who signals this fence.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> FenceOwner {
        self.owner
    }

    /// Last observed state. Does not query the native object.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> FenceState {
        self.state
    }

    /// Returns `true` if a wait or poll has observed the signal.
    #[inline]
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.state == FenceState::Signaled
    }

    /// Waits up to `timeout`, reporting whether the fence signaled.
    ///
    /// Errors only when the native object is in an error state; a timeout is
    /// `Ok(false)`.
    pub fn try_wait(&mut self, timeout: Duration) -> PresentResult<bool> {
        match self.state {
            FenceState::Signaled => return Ok(true),
            FenceState::Error => {
                return Err(self.failure(io::Error::other("fence previously failed")));
            }
            FenceState::Pending => {}
        }
        let Some(sync) = self.sync.as_ref() else {
            return Err(self.failure(io::Error::other("fence already disposed")));
        };
        match sync.wait(timeout) {
            Ok(true) => {
                self.state = FenceState::Signaled;
                tracing::trace!(id = ?self.id, owner = ?self.owner, "fence signaled");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(source) => {
                self.state = FenceState::Error;
                Err(self.failure(source))
            }
        }
    }

    /// Blocks until the fence signals or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> PresentResult<()> {
        if self.try_wait(timeout)? {
            Ok(())
        } else {
            Err(PresentError::FenceTimeout {
                fence: self.id,
                owner: self.owner,
                timeout,
            })
        }
    }

    /// Non-blocking readiness check.
    pub fn poll(&mut self) -> PresentResult<bool> {
        self.try_wait(Duration::ZERO)
    }

    /// Releases the underlying object.
    pub fn dispose(mut self) {
        self.release(true);
    }

    fn release(&mut self, explicit: bool) {
        let Some(sync) = self.sync.take() else {
            return;
        };
        drop(sync);
        let dropped_pending = !explicit && self.state == FenceState::Pending;
        self.ledger.record_disposed(dropped_pending);
        if dropped_pending {
            tracing::warn!(
                id = ?self.id,
                owner = ?self.owner,
                "pending fence dropped without dispose"
            );
        } else {
            tracing::trace!(
                id = ?self.id,
                owner = ?self.owner,
                state = ?self.state,
                "fence disposed"
            );
        }
    }

    fn failure(&self, source: io::Error) -> PresentError {
        PresentError::FenceFailed {
            fence: self.id,
            owner: self.owner,
            source,
        }
    }
}

impl Drop for NativeFence {
    fn drop(&mut self) {
        self.release(false);
    }
}

impl fmt::Debug for NativeFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFence")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualFence;

    #[test]
    fn wait_observes_signal_once() {
        let ledger = FenceLedger::new();
        let (sync, trigger) = ManualFence::pending();
        let mut fence = NativeFence::new(Box::new(sync), FenceOwner::Gpu, &ledger);

        assert!(!fence.poll().expect("poll"), "pending fence polls false");
        trigger.signal();
        fence.wait(Duration::from_millis(10)).expect("signaled wait");
        assert!(fence.is_signaled(), "state latches");

        let native_waits = trigger.wait_calls();
        fence.wait(Duration::ZERO).expect("second wait");
        assert_eq!(
            trigger.wait_calls(),
            native_waits,
            "waits after signal must not touch the native object"
        );
    }

    #[test]
    fn bounded_wait_times_out() {
        let ledger = FenceLedger::new();
        let (sync, _trigger) = ManualFence::pending();
        let mut fence = NativeFence::new(Box::new(sync), FenceOwner::Display, &ledger);

        let err = fence.wait(Duration::from_millis(2)).unwrap_err();
        assert!(
            matches!(
                err,
                PresentError::FenceTimeout {
                    owner: FenceOwner::Display,
                    ..
                }
            ),
            "expected timeout, got {err:?}"
        );
        assert_eq!(fence.state(), FenceState::Pending, "timeout is not terminal");
    }

    #[test]
    fn error_state_is_terminal() {
        let ledger = FenceLedger::new();
        let (sync, trigger) = ManualFence::pending();
        let mut fence = NativeFence::new(Box::new(sync), FenceOwner::Gpu, &ledger);
        trigger.fail();

        assert!(
            matches!(fence.poll(), Err(PresentError::FenceFailed { .. })),
            "failed fence reports an error"
        );
        assert_eq!(fence.state(), FenceState::Error);
        trigger.signal();
        assert!(fence.poll().is_err(), "error state does not recover");
    }

    #[test]
    fn ledger_counts_dispose_and_drop() {
        let ledger = FenceLedger::new();
        let a = NativeFence::new(Box::new(ManualFence::signaled()), FenceOwner::Gpu, &ledger);
        let b = NativeFence::new(Box::new(ManualFence::signaled()), FenceOwner::Gpu, &ledger);
        assert_ne!(a.id(), b.id(), "ids are unique per ledger");
        assert_eq!(ledger.outstanding(), 2);

        a.dispose();
        assert_eq!(ledger.disposed(), 1, "explicit dispose is counted");
        drop(b);
        assert_eq!(ledger.created(), 2);
        assert_eq!(ledger.outstanding(), 0, "drop disposes too");
        assert_eq!(ledger.dropped_pending(), 0, "signaled fences may be dropped");
    }

    #[test]
    fn dropping_a_pending_fence_is_flagged() {
        let ledger = FenceLedger::new();
        let (sync, _trigger) = ManualFence::pending();
        let disposed = NativeFence::new(Box::new(sync), FenceOwner::Display, &ledger);
        let (sync, _trigger) = ManualFence::pending();
        let dropped = NativeFence::new(Box::new(sync), FenceOwner::Display, &ledger);

        disposed.dispose();
        assert_eq!(ledger.dropped_pending(), 0, "explicit dispose is not flagged");
        drop(dropped);
        assert_eq!(ledger.dropped_pending(), 1, "implicit drop while pending");
        assert_eq!(ledger.outstanding(), 0, "both still count as disposed");
    }
}
