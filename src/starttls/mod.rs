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

//! Server-side emulation of the plaintext phase of protocols that upgrade to
//! TLS in-band ("STARTTLS").
//!
//! Each negotiation takes a freshly accepted plaintext stream and runs one
//! fixed conversation — FTP (RFC 2228 style), SMTP (RFC 3207), or XMPP
//! (RFC 6120) — to the exact point where the peer expects the TLS handshake
//! to begin on the same stream. The negotiators perform no encryption
//! themselves; a `Ready` outcome means the caller may hand the stream to the
//! TLS acceptor, and nothing else.
//!
//! The three conversations differ enough in shape (bounded retry loop vs.
//! strict two-step, line framing vs. streamed markup) that they are three
//! concrete functions rather than one parameterised state machine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod ftp;
pub mod smtp;
pub mod transport;
pub mod xmpp;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
mod scripted;

pub use self::transport::{PollStream, SessionStream};

use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// How many non-matching exchanges are tolerated before the handshake is
/// declared failed.
///
/// This is a hard ceiling. Capability queries (`FEAT`, `EHLO`) and the
/// upgrade command itself do not count against it; everything else,
/// including a wait that produced no bytes at all, does.
pub(crate) const MAX_ATTEMPTS: u32 = 16;

/// The terminal result of a plaintext STARTTLS negotiation.
///
/// An enum rather than a bool so that a failure reason can be attached later
/// without breaking callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The peer completed the upgrade dialogue; the TLS handshake may begin
    /// on the same stream, positioned exactly after the last plaintext byte.
    Ready,
    /// The peer did not follow the expected upgrade sequence.
    Failed,
}

impl Outcome {
    pub fn is_ready(self) -> bool {
        matches!(self, Outcome::Ready)
    }
}

/// The application protocol whose STARTTLS phase is being emulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Smtp,
    Xmpp,
}

impl Protocol {
    /// Label used in logs and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Smtp => "smtp",
            Protocol::Xmpp => "xmpp",
        }
    }

    /// Run this protocol's upgrade conversation over `io`.
    pub fn negotiate(
        self,
        io: &mut impl SessionStream,
        timeout: Duration,
        log_prefix: &LogPrefix,
    ) -> Result<Outcome, Error> {
        match self {
            Protocol::Ftp => ftp::negotiate_ftp(io, timeout, log_prefix),
            Protocol::Smtp => smtp::negotiate_smtp(io, timeout, log_prefix),
            Protocol::Xmpp => xmpp::negotiate_xmpp(io, timeout, log_prefix),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "smtp" => Ok(Protocol::Smtp),
            "xmpp" => Ok(Protocol::Xmpp),
            other => Err(format!(
                "unknown protocol '{}', expected ftp|smtp|xmpp",
                other
            )),
        }
    }
}
