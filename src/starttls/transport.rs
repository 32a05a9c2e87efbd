//-
// Copyright (c) 2026, The Opportune developers
//
// This file is part of Opportune.
//
// Opportune is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Opportune is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with Opportune. If not, see <http://www.gnu.org/licenses/>.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use nix::libc::c_int;
use nix::poll::{poll, PollFd, PollFlags};

/// The most bytes consumed from the peer in one exchange.
///
/// Every message in the three upgrade dialogues fits comfortably within
/// this; a chunk this size that still doesn't match is non-conformant
/// anyway.
const MAX_CHUNK: usize = 4096;

/// The duplex byte channel a negotiation runs over.
///
/// `read_chunk` is the "wait, then take whatever arrived" primitive the
/// upgrade dialogues are built on; writes go through the `Write` impl and
/// must be flushed before a blocking wait so a peer that is itself waiting
/// for data sees them.
pub trait SessionStream: Write {
    /// Wait up to `timeout` for the peer to send something, then consume
    /// whatever bytes are immediately available as one chunk.
    ///
    /// An empty chunk means the wait expired or the peer closed the stream;
    /// callers fold both into the non-matching path. An error means the
    /// transport itself became unusable.
    fn read_chunk(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;
}

/// `SessionStream` over anything with a pollable file descriptor.
pub struct PollStream<T> {
    inner: T,
}

impl<T: Read + Write + AsRawFd> PollStream<T> {
    pub fn new(inner: T) -> Self {
        PollStream { inner }
    }

    /// Recover the underlying stream, positioned exactly after the last
    /// byte exchanged, for the TLS handshake to take over.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write> Write for PollStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: Read + Write + AsRawFd> SessionStream for PollStream<T> {
    fn read_chunk(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        if !wait_readable(self.inner.as_raw_fd(), timeout)? {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; MAX_CHUNK];
        let nread = match self.inner.read(&mut buf) {
            Ok(n) => n,
            // A spurious wakeup on a non-blocking fd; same as a timeout.
            Err(ref e) if io::ErrorKind::WouldBlock == e.kind() => 0,
            Err(e) => return Err(e),
        };
        buf.truncate(nread);
        Ok(buf)
    }
}

fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let timeout_ms =
        timeout.as_millis().min(c_int::max_value() as u128) as c_int;

    loop {
        let mut fds =
            [PollFd::new(fd, PollFlags::POLLIN | PollFlags::POLLERR)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => continue,
            Err(e) => return Err(nix_to_io(e)),
        }
    }
}

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e.as_errno().unwrap() as i32)
}
