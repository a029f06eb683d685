// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::{Duration, Instant};

use super::NativeFence;
use crate::cancel::CancelToken;
use crate::{PresentError, PresentResult};

/// Cancellation-aware blocking wait policy.
///
/// Waits run in slices of at most `slice`; the cancel token is checked
/// before each slice. With a `timeout`, the total wait is bounded and ends in
/// [`PresentError::FenceTimeout`]; without one, only cancellation or a fence
/// error ends it.
#[derive(Clone, Debug)]
pub struct FenceWaiter {
    timeout: Option<Duration>,
    slice: Duration,
    cancel: CancelToken,
}

impl FenceWaiter {
    /// Creates a waiter. A zero `slice` is raised to one millisecond.
    #[must_use]
    pub fn new(timeout: Option<Duration>, slice: Duration, cancel: CancelToken) -> Self {
        Self {
            timeout,
            slice: slice.max(Duration::from_millis(1)),
            cancel,
        }
    }

    /// Total bound, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Cancel token checked between slices.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Blocks until `fence` signals.
    ///
    /// A fence already observed as signaled returns immediately, even when
    /// cancellation has been requested.
    pub fn wait(&self, fence: &mut NativeFence) -> PresentResult<()> {
        if fence.is_signaled() {
            return Ok(());
        }
        let start = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(PresentError::Cancelled);
            }
            let step = match self.timeout {
                Some(total) => {
                    let left = total.saturating_sub(start.elapsed());
                    if left.is_zero() {
                        tracing::warn!(
                            fence = ?fence.id(),
                            owner = ?fence.owner(),
                            ?total,
                            "fence wait timed out"
                        );
                        return Err(PresentError::FenceTimeout {
                            fence: fence.id(),
                            owner: fence.owner(),
                            timeout: total,
                        });
                    }
                    left.min(self.slice)
                }
                None => self.slice,
            };
            if fence.try_wait(step)? {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::{FenceLedger, FenceOwner};
    use crate::testing::ManualFence;

    fn pending_fence(ledger: &FenceLedger) -> (NativeFence, crate::testing::FenceTrigger) {
        let (sync, trigger) = ManualFence::pending();
        (
            NativeFence::new(Box::new(sync), FenceOwner::Display, ledger),
            trigger,
        )
    }

    #[test]
    fn bounded_wait_reports_timeout() {
        let ledger = FenceLedger::new();
        let (mut fence, _trigger) = pending_fence(&ledger);
        let waiter = FenceWaiter::new(
            Some(Duration::from_millis(10)),
            Duration::from_millis(2),
            CancelToken::new(),
        );
        let err = waiter.wait(&mut fence).unwrap_err();
        assert!(
            matches!(err, PresentError::FenceTimeout { timeout, .. } if timeout == Duration::from_millis(10)),
            "expected timeout, got {err:?}"
        );
    }

    #[test]
    fn unbounded_wait_ends_on_cancel() {
        let ledger = FenceLedger::new();
        let (mut fence, _trigger) = pending_fence(&ledger);
        let cancel = CancelToken::new();
        let waiter = FenceWaiter::new(None, Duration::from_millis(1), cancel.clone());

        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.cancel();
        });
        let err = waiter.wait(&mut fence).unwrap_err();
        handle.join().expect("cancel thread");
        assert!(matches!(err, PresentError::Cancelled), "got {err:?}");
    }

    #[test]
    fn signal_from_another_thread_completes_wait() {
        let ledger = FenceLedger::new();
        let (mut fence, trigger) = pending_fence(&ledger);
        let waiter = FenceWaiter::new(
            Some(Duration::from_secs(5)),
            Duration::from_millis(1),
            CancelToken::new(),
        );
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(3));
            trigger.signal();
        });
        waiter.wait(&mut fence).expect("signaled");
        handle.join().expect("signal thread");
        assert!(fence.is_signaled(), "wait latches the signal");
    }

    #[test]
    fn signaled_fence_ignores_cancel() {
        let ledger = FenceLedger::new();
        let (mut fence, trigger) = pending_fence(&ledger);
        trigger.signal();
        assert!(fence.poll().expect("poll"), "observed signal");

        let cancel = CancelToken::new();
        cancel.cancel();
        let waiter = FenceWaiter::new(None, Duration::from_millis(1), cancel);
        waiter.wait(&mut fence).expect("already signaled");
    }
}
