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

//! A deterministic `SessionStream` for unit-testing the upgrade dialogues
//! without sockets or clocks.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use super::transport::SessionStream;

/// Plays back a fixed script of incoming chunks and records every outgoing
/// byte.
pub(super) struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    pub(super) written: Vec<u8>,
    pub(super) flushes: usize,
}

impl ScriptedStream {
    /// One entry per `read_chunk` call, in order. An empty entry simulates
    /// a wait that produced no bytes; once the script runs out, every
    /// further wait does the same.
    pub(super) fn new(chunks: &[&[u8]]) -> Self {
        Self::from_chunks(chunks.iter().map(|c| c.to_vec()).collect())
    }

    pub(super) fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        ScriptedStream {
            chunks: chunks.into(),
            written: Vec::new(),
            flushes: 0,
        }
    }

    /// Chunks the negotiation never consumed.
    pub(super) fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl SessionStream for ScriptedStream {
    fn read_chunk(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        Ok(self.chunks.pop_front().unwrap_or_default())
    }
}
