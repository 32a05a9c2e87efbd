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

use std::io::Write;
use std::time::Duration;

use log::{info, warn};

use super::transport::SessionStream;
use super::Outcome;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

// XMPP has no line terminators; intent is disambiguated by matching the
// leading bytes of the streamed XML, not by parsing it.
const STREAM_HEADER_PREFIX: &[u8] = b"<stream:stream xmlns='jabber:client'";
const STREAM_FEATURES: &[u8] =
    b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
      xmlns='jabber:client' xml:lang='en' version='1.0'>\
      <stream:features>\
      <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
      </stream:features>";
const STARTTLS_PREFIX: &[u8] =
    b"<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'>";
const PROCEED: &[u8] = b"<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>";

/// Run the server side of the XMPP stream negotiation up to TLS (RFC 6120).
///
/// Unlike the line-oriented variants this is a strict two-step handshake
/// with one chance per step: the peer's stream header, then its starttls
/// request. Any mismatch, including a wait that produced no bytes, fails
/// the negotiation immediately.
pub fn negotiate_xmpp(
    io: &mut impl SessionStream,
    timeout: Duration,
    log_prefix: &LogPrefix,
) -> Result<Outcome, Error> {
    info!("{} Initiating XMPP STARTTLS sequence", log_prefix);

    let chunk = io.read_chunk(timeout)?;
    if !chunk.starts_with(STREAM_HEADER_PREFIX) {
        warn!("{} Unexpected STARTTLS sequence", log_prefix);
        return Ok(Outcome::Failed);
    }

    io.write_all(STREAM_FEATURES)?;
    // The peer will not speak until it has seen the features; the flush is
    // the only message boundary there is.
    io.flush()?;

    let chunk = io.read_chunk(timeout)?;
    if !chunk.starts_with(STARTTLS_PREFIX) {
        warn!("{} Unexpected STARTTLS sequence", log_prefix);
        return Ok(Outcome::Failed);
    }

    io.write_all(PROCEED)?;
    io.flush()?;

    info!("{} XMPP STARTTLS sequence completed", log_prefix);
    Ok(Outcome::Ready)
}

#[cfg(test)]
mod test {
    use super::super::scripted::ScriptedStream;
    use super::*;

    fn negotiate(stream: &mut ScriptedStream) -> Outcome {
        negotiate_xmpp(
            stream,
            Duration::from_millis(1),
            &LogPrefix::new("xmpp".to_owned()),
        )
        .unwrap()
    }

    const STREAM_HEADER: &[u8] =
        b"<stream:stream xmlns='jabber:client' \
          xmlns:stream='http://etherx.jabber.org/streams' \
          to='mail.example.org' version='1.0'>";
    const STARTTLS_REQUEST: &[u8] =
        b"<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'>";

    #[test]
    fn successful_upgrade_writes_features_then_proceed() {
        crate::init_test_log();

        let mut stream =
            ScriptedStream::new(&[STREAM_HEADER, STARTTLS_REQUEST]);
        assert_eq!(Outcome::Ready, negotiate(&mut stream));

        let expected: Vec<u8> =
            [STREAM_FEATURES, PROCEED].concat();
        assert_eq!(expected, stream.written);
        assert_eq!(2, stream.flushes);
    }

    #[test]
    fn wrong_opening_tag_fails_with_nothing_written() {
        crate::init_test_log();

        let mut stream = ScriptedStream::new(&[b"<iq/>"]);
        assert_eq!(Outcome::Failed, negotiate(&mut stream));
        assert!(stream.written.is_empty());
    }

    #[test]
    fn timeout_on_first_read_fails_with_nothing_written() {
        crate::init_test_log();

        let mut stream = ScriptedStream::new(&[]);
        assert_eq!(Outcome::Failed, negotiate(&mut stream));
        assert!(stream.written.is_empty());
    }

    #[test]
    fn missing_starttls_request_fails_after_features() {
        crate::init_test_log();

        let mut stream = ScriptedStream::new(&[STREAM_HEADER]);
        assert_eq!(Outcome::Failed, negotiate(&mut stream));
        // The features were sent, but proceed never is.
        assert_eq!(STREAM_FEATURES, &*stream.written);
    }

    #[test]
    fn swapped_messages_fail_at_the_first_step() {
        crate::init_test_log();

        let mut stream =
            ScriptedStream::new(&[STARTTLS_REQUEST, STREAM_HEADER]);
        assert_eq!(Outcome::Failed, negotiate(&mut stream));
        assert!(stream.written.is_empty());
    }

    #[test]
    fn stream_header_matches_on_prefix_alone() {
        crate::init_test_log();

        // Trailing attributes vary by client; only the leading bytes count.
        let mut stream = ScriptedStream::new(&[
            b"<stream:stream xmlns='jabber:client' id='deadbeef'>",
            STARTTLS_REQUEST,
        ]);
        assert_eq!(Outcome::Ready, negotiate(&mut stream));
    }
}
