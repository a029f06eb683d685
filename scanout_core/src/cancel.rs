// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared between the loop and whoever wants to stop it
//! (a signal-handling thread, a timer, a UI). The loop checks it once per
//! iteration, again before submission, and between slices of every blocking
//! fence wait, so a cancel request is honored within one wait slice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared, clonable stop request.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any
    /// clone of this token.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let remote = token.clone();
        assert!(!token.is_cancelled(), "fresh token is live");
        remote.cancel();
        remote.cancel();
        assert!(token.is_cancelled(), "cancel is visible through clones");
    }

    #[test]
    fn cancel_crosses_threads() {
        let token = CancelToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel())
            .join()
            .expect("cancel thread panicked");
        assert!(token.is_cancelled(), "cancel from another thread");
    }
}
