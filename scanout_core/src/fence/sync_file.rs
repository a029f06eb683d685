// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Kernel `sync_file` descriptors.
//!
//! A `sync_file` becomes readable (`POLLIN`) when every fence it wraps has
//! signaled. Any descriptor with the same readiness semantics works, which is
//! how the simulated backend uses the read end of a pipe.

use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::time::{Duration, Instant};

use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;

use super::NativeSync;
use crate::time::duration_to_timespec;

/// An owned fence file descriptor.
#[derive(Debug)]
pub struct SyncFile {
    fd: OwnedFd,
}

impl SyncFile {
    /// Takes ownership of `fd`. It is closed when the `SyncFile` is dropped.
    #[must_use]
    pub const fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Duplicates the descriptor, for handing a fence to a second consumer.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            fd: self.fd.try_clone()?,
        })
    }
}

impl AsFd for SyncFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<OwnedFd> for SyncFile {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

impl NativeSync for SyncFile {
    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let start = Instant::now();
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            let ts = duration_to_timespec(remaining);
            let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
            match poll(&mut fds, Some(&ts)) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let revents = fds[0].revents();
                    if revents.contains(PollFlags::IN) {
                        return Ok(true);
                    }
                    if revents.intersects(PollFlags::ERR | PollFlags::HUP | PollFlags::NVAL) {
                        return Err(io::Error::other(format!(
                            "sync file reported {revents:?}"
                        )));
                    }
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                }
                Err(Errno::INTR) => {
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                }
                Err(errno) => return Err(errno.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_becomes_signaled_after_write() {
        let (read, write) = rustix::pipe::pipe().expect("pipe");
        let fence = SyncFile::new(read);
        assert!(!fence.wait(Duration::ZERO).expect("poll"), "empty pipe is pending");

        rustix::io::write(&write, &[1]).expect("write");
        assert!(
            fence.wait(Duration::from_millis(50)).expect("wait"),
            "readable pipe is signaled"
        );
        assert!(
            fence.wait(Duration::ZERO).expect("repoll"),
            "signal is level-triggered"
        );
    }

    #[test]
    fn bounded_wait_returns_false() {
        let (read, _write) = rustix::pipe::pipe().expect("pipe");
        let fence = SyncFile::new(read);
        let start = Instant::now();
        assert!(!fence.wait(Duration::from_millis(5)).expect("wait"));
        assert!(
            start.elapsed() >= Duration::from_millis(4),
            "wait honors its bound"
        );
    }

    #[test]
    fn closed_writer_without_data_is_an_error() {
        let (read, write) = rustix::pipe::pipe().expect("pipe");
        drop(write);
        let fence = SyncFile::new(read);
        assert!(
            fence.wait(Duration::from_millis(5)).is_err(),
            "hangup without signal is a fence error"
        );
    }

    #[test]
    fn clone_shares_signal() {
        let (read, write) = rustix::pipe::pipe().expect("pipe");
        let fence = SyncFile::new(read);
        let copy = fence.try_clone().expect("dup");
        rustix::io::write(&write, &[1]).expect("write");
        assert!(copy.wait(Duration::from_millis(50)).expect("wait"));
    }
}
