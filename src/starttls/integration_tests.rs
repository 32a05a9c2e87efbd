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

//! End-to-end tests of the three upgrade dialogues over a real socketpair
//! and the poll-based transport, with the server half of the conversation
//! on its own thread, as it would be in production.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::{Outcome, PollStream, Protocol, SessionStream};
use crate::support::log_prefix::LogPrefix;

const TIMEOUT: Duration = Duration::from_millis(200);

fn connect(
    protocol: Protocol,
    cxn_name: &'static str,
) -> (UnixStream, mpsc::Receiver<Outcome>) {
    crate::init_test_log();

    let (server_io, client_io) = UnixStream::pair().unwrap();
    let (outcome_tx, outcome_rx) = mpsc::channel();

    thread::spawn(move || {
        let log_prefix = LogPrefix::new(protocol.to_string());
        log_prefix.set_peer(cxn_name.to_owned());

        let mut stream = PollStream::new(server_io);
        let outcome = protocol
            .negotiate(&mut stream, TIMEOUT, &log_prefix)
            .expect("Transport failure during negotiation");
        let _ = outcome_tx.send(outcome);
    });

    (client_io, outcome_rx)
}

fn read_line(r: &mut impl BufRead) -> String {
    let mut line = String::new();
    r.read_line(&mut line).unwrap();
    line
}

#[test]
fn ftp_upgrade() {
    let (mut cxn, outcome) = connect(Protocol::Ftp, "ftp_upgrade");
    let mut responses = BufReader::new(cxn.try_clone().unwrap());

    assert_eq!("220 ready.\r\n", read_line(&mut responses));

    cxn.write_all(b"FEAT\r\n").unwrap();
    assert_eq!("211-Features supported:\r\n", read_line(&mut responses));
    assert_eq!("AUTH TLS\r\n", read_line(&mut responses));
    assert_eq!("211 End FEAT.\r\n", read_line(&mut responses));

    cxn.write_all(b"AUTH TLS\r\n").unwrap();
    assert_eq!("234 AUTH TLS successful.\r\n", read_line(&mut responses));

    assert_eq!(Outcome::Ready, outcome.recv().unwrap());
}

#[test]
fn smtp_upgrade() {
    let (mut cxn, outcome) = connect(Protocol::Smtp, "smtp_upgrade");
    let mut responses = BufReader::new(cxn.try_clone().unwrap());

    assert_eq!(
        "220 mail.example.org ESMTP service ready\r\n",
        read_line(&mut responses),
    );

    cxn.write_all(b"EHLO client.example.com\r\n").unwrap();
    assert_eq!(
        "250-mail.example.org offers a warm hug of welcome\r\n",
        read_line(&mut responses),
    );
    assert_eq!("250 STARTTLS\r\n", read_line(&mut responses));

    cxn.write_all(b"STARTTLS\r\n").unwrap();
    assert_eq!("220 Go ahead\r\n", read_line(&mut responses));

    assert_eq!(Outcome::Ready, outcome.recv().unwrap());
}

#[test]
fn xmpp_upgrade() {
    let (mut cxn, outcome) = connect(Protocol::Xmpp, "xmpp_upgrade");

    cxn.write_all(
        b"<stream:stream xmlns='jabber:client' \
          xmlns:stream='http://etherx.jabber.org/streams' \
          to='mail.example.org' version='1.0'>",
    )
    .unwrap();

    let expected_features: &[u8] =
        b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams' \
          xmlns='jabber:client' xml:lang='en' version='1.0'>\
          <stream:features>\
          <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'>\
          <required/></starttls>\
          </stream:features>";
    let mut features = vec![0u8; expected_features.len()];
    cxn.read_exact(&mut features).unwrap();
    assert_eq!(expected_features, &*features);

    cxn.write_all(b"<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'>")
        .unwrap();

    let expected_proceed: &[u8] =
        b"<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>";
    let mut proceed = vec![0u8; expected_proceed.len()];
    cxn.read_exact(&mut proceed).unwrap();
    assert_eq!(expected_proceed, &*proceed);

    assert_eq!(Outcome::Ready, outcome.recv().unwrap());
}

#[test]
fn xmpp_rejects_other_stanzas_without_replying() {
    let (mut cxn, outcome) = connect(Protocol::Xmpp, "xmpp_reject");

    cxn.write_all(b"<iq/>").unwrap();
    assert_eq!(Outcome::Failed, outcome.recv().unwrap());

    // The negotiator wrote nothing back; the next read is a clean EOF once
    // the server thread drops its end.
    let mut rest = Vec::new();
    cxn.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn ftp_gives_up_after_peer_disconnect() {
    let (mut cxn, outcome) = connect(Protocol::Ftp, "ftp_disconnect");
    let mut responses = BufReader::new(cxn.try_clone().unwrap());

    assert_eq!("220 ready.\r\n", read_line(&mut responses));
    cxn.write_all(b"USER anonymous\r\n").unwrap();
    drop(cxn);
    drop(responses);

    // One non-matching command, then a stream of zero-byte reads from the
    // closed socket; the budget runs out without waiting on the clock.
    assert_eq!(Outcome::Failed, outcome.recv().unwrap());
}

#[test]
fn poll_read_times_out_to_an_empty_chunk() {
    crate::init_test_log();

    let (server_io, _client_io) = UnixStream::pair().unwrap();
    let mut stream = PollStream::new(server_io);

    let chunk = stream.read_chunk(Duration::from_millis(10)).unwrap();
    assert!(chunk.is_empty());
}

#[test]
fn silent_peer_exhausts_the_budget() {
    crate::init_test_log();

    let (server_io, _client_io) = UnixStream::pair().unwrap();
    let mut stream = PollStream::new(server_io);

    let outcome = super::smtp::negotiate_smtp(
        &mut stream,
        Duration::from_millis(10),
        &LogPrefix::new("smtp".to_owned()),
    )
    .unwrap();
    assert_eq!(Outcome::Failed, outcome);
}
