// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipe-backed fences.
//!
//! The read end is handed out as a [`SyncFile`]; it polls readable once the
//! write end has been written to, which is exactly how a kernel `sync_file`
//! behaves when its fence signals.

use std::io;
use std::os::fd::OwnedFd;

use scanout_core::fence::SyncFile;

/// Write end of a pipe fence.
#[derive(Debug)]
pub(crate) struct Signaler {
    write: OwnedFd,
    signaled: bool,
}

impl Signaler {
    /// Signals the fence. Later calls do nothing.
    pub(crate) fn signal(&mut self) -> io::Result<()> {
        if self.signaled {
            return Ok(());
        }
        rustix::io::write(&self.write, &[1])?;
        self.signaled = true;
        Ok(())
    }

    /// Signals, logging instead of failing.
    pub(crate) fn signal_or_warn(&mut self, what: &'static str) {
        if let Err(err) = self.signal() {
            tracing::warn!(%err, what, "failed to signal fence");
        }
    }
}

/// Creates an unsignaled fence.
pub(crate) fn fence_pipe() -> io::Result<(SyncFile, Signaler)> {
    let (read, write) = rustix::pipe::pipe()?;
    Ok((
        SyncFile::new(read),
        Signaler {
            write,
            signaled: false,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scanout_core::fence::NativeSync;

    use super::*;

    #[test]
    fn signal_is_idempotent() {
        let (fence, mut signaler) = fence_pipe().expect("pipe");
        assert!(!fence.wait(Duration::ZERO).expect("poll"), "starts pending");
        signaler.signal().expect("signal");
        signaler.signal().expect("second signal");
        assert!(fence.wait(Duration::ZERO).expect("poll"), "signaled");
    }

    #[test]
    fn cloned_fence_observes_the_same_signal() {
        let (fence, mut signaler) = fence_pipe().expect("pipe");
        let clone = fence.try_clone().expect("dup");
        signaler.signal_or_warn("test");
        assert!(clone.wait(Duration::from_millis(10)).expect("wait"));
        assert!(fence.wait(Duration::ZERO).expect("poll"));
    }
}
