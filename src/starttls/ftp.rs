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
use super::{Outcome, MAX_ATTEMPTS};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

const GREETING: &[u8] = b"220 ready.\r\n";
const FEAT_QUERY: &[u8] = b"FEAT\r\n";
const FEAT_RESPONSE: &[&[u8]] = &[
    b"211-Features supported:\r\n",
    b"AUTH TLS\r\n",
    b"211 End FEAT.\r\n",
];
const AUTH_TLS: &[u8] = b"AUTH TLS\r\n";
const AUTH_TLS_OK: &[u8] = b"234 AUTH TLS successful.\r\n";

/// Run the server side of the FTP (RFC 2228 style) upgrade dialogue over the
/// control connection.
///
/// The greeting is sent unconditionally, then the peer gets up to
/// `MAX_ATTEMPTS` exchanges to issue `AUTH TLS`. `FEAT` may be queried any
/// number of times along the way. Commands are matched byte-exact against
/// the full line including the terminator; a command split across two reads
/// is two non-matching chunks.
pub fn negotiate_ftp(
    io: &mut impl SessionStream,
    timeout: Duration,
    log_prefix: &LogPrefix,
) -> Result<Outcome, Error> {
    info!("{} Initiating FTP STARTTLS sequence", log_prefix);

    io.write_all(GREETING)?;
    io.flush()?;

    let mut attempt = 0;
    while attempt < MAX_ATTEMPTS {
        let chunk = io.read_chunk(timeout)?;
        if chunk == FEAT_QUERY {
            for line in FEAT_RESPONSE {
                io.write_all(line)?;
            }
            io.flush()?;
        } else if chunk == AUTH_TLS {
            io.write_all(AUTH_TLS_OK)?;
            io.flush()?;
            info!("{} FTP STARTTLS sequence completed", log_prefix);
            return Ok(Outcome::Ready);
        } else {
            // Only unrecognised chunks consume the budget; FEAT exchanges
            // repeat for free.
            attempt += 1;
        }
    }

    warn!("{} Unexpected STARTTLS sequence", log_prefix);
    Ok(Outcome::Failed)
}
