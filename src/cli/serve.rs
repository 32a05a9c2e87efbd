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
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use nix::sys::time::TimeValLike;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use crate::starttls::{PollStream, Protocol};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

// Need to use this and not die! so that errors go to syslog/etc
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        error!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

/// Serve one STARTTLS negotiation over standard IO.
///
/// The plaintext dialogue for `protocol` is run against the peer on the
/// other side of stdin/stdout. Only if the peer completes the upgrade
/// sequence is the TLS acceptor started on the same stream; this function
/// never writes an encrypted byte before the peer has asked for encryption.
pub fn starttls(
    system_config: SystemConfig,
    system_root: PathBuf,
    protocol: Protocol,
) {
    let acceptor = match create_ssl_acceptor(&system_config, &system_root) {
        Ok(acceptor) => acceptor,
        Err(e) => fatal!(
            EX_CONFIG,
            "Unable to initialise the TLS acceptor: {}",
            e
        ),
    };

    let log_prefix = LogPrefix::new(protocol.to_string());
    configure_socket(&log_prefix);

    let mut stream = PollStream::new(Stdio);
    let outcome = match protocol.negotiate(
        &mut stream,
        system_config.starttls.read_timeout(),
        &log_prefix,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("{} Connection lost during negotiation: {}", log_prefix, e);
            std::process::exit(0)
        }
    };

    if !outcome.is_ready() {
        // The negotiator has already logged the advisory; there is nothing
        // to hand to the TLS layer.
        std::process::exit(0);
    }

    match acceptor.accept(stream.into_inner()) {
        Ok(mut ssl_stream) => {
            {
                let ssl = ssl_stream.ssl();
                info!(
                    "{} TLS handshake succeeded: {} {}",
                    log_prefix,
                    ssl.version_str(),
                    ssl.current_cipher()
                        .map(|c| c.name())
                        .unwrap_or("unknown"),
                );
            }
            let _ = ssl_stream.shutdown();
        }
        Err(e) => warn!("{} TLS handshake failed: {}", log_prefix, e),
    }
}

fn create_ssl_acceptor(
    system_config: &SystemConfig,
    system_root: &Path,
) -> Result<SslAcceptor, Error> {
    let mut acceptor =
        SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
    acceptor.set_private_key_file(
        system_root.join(&system_config.tls.private_key),
        SslFiletype::PEM,
    )?;
    acceptor.set_certificate_chain_file(
        system_root.join(&system_config.tls.certificate_chain),
    )?;
    acceptor.check_private_key()?;
    Ok(acceptor.build())
}

fn configure_socket(log_prefix: &LogPrefix) {
    match (nix::unistd::isatty(STDIN), nix::unistd::isatty(STDOUT)) {
        (Ok(true), _) | (_, Ok(true)) => {
            // In this case, we *do* want to use die!() since we're on a
            // terminal.
            die!(EX_USAGE, "stdin and stdout must not be a terminal")
        }
        _ => (),
    }

    let mut peer_name = match nix::sys::socket::getpeername(STDIN) {
        Ok(addr) => addr.to_string(),
        Err(e) => {
            warn!("Unable to determine peer name: {}", e);
            "unknown-socket".to_owned()
        }
    };

    // On FreeBSD, getpeername() on a UNIX socket returns "@\0", which breaks
    // syslog if we log that.
    if peer_name.contains('\0') {
        peer_name = "unknown-socket".to_owned();
    }

    log_prefix.set_peer(peer_name);

    // The poll-based reads bound the plaintext phase; these timeouts bound
    // the TLS handshake that follows it.
    if let Err(e) = nix::sys::socket::setsockopt(
        STDIN,
        nix::sys::socket::sockopt::ReceiveTimeout,
        &nix::sys::time::TimeVal::minutes(30),
    )
    .and_then(|_| {
        nix::sys::socket::setsockopt(
            STDOUT,
            nix::sys::socket::sockopt::SendTimeout,
            &nix::sys::time::TimeVal::minutes(30),
        )
    }) {
        warn!("{} Unable to configure timeouts: {}", log_prefix, e);
    }

    // It is not unusual for stdio to be UNIX sockets instead of TCP, so don't
    // complain if setting TCP_NODELAY fails.
    let _ = nix::sys::socket::setsockopt(
        STDOUT,
        nix::sys::socket::sockopt::TcpNoDelay,
        &true,
    );

    info!("{} Connection established", log_prefix);
}

// Read and write the stdio FDs without buffering
#[derive(Debug)]
struct Stdio;

impl Read for Stdio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        nix::unistd::read(STDIN, buf).map_err(nix_to_io)
    }
}

impl Write for Stdio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        nix::unistd::write(STDOUT, buf).map_err(nix_to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for Stdio {
    // Only ever polled for readability.
    fn as_raw_fd(&self) -> RawFd {
        STDIN
    }
}

fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e.as_errno().unwrap() as i32)
}
