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

const GREETING: &[u8] = b"220 mail.example.org ESMTP service ready\r\n";
// The hostname argument varies, so EHLO is matched on its prefix alone.
const EHLO_PREFIX: &[u8] = b"EHLO ";
const EHLO_RESPONSE: &[&[u8]] = &[
    b"250-mail.example.org offers a warm hug of welcome\r\n",
    b"250 STARTTLS\r\n",
];
const STARTTLS: &[u8] = b"STARTTLS\r\n";
const GO_AHEAD: &[u8] = b"220 Go ahead\r\n";

/// Run the server side of the SMTP opportunistic-TLS dialogue (RFC 3207).
///
/// Same shape as the FTP variant: service-ready greeting up front, then up
/// to `MAX_ATTEMPTS` exchanges for the peer to issue `STARTTLS`. `EHLO`
/// (with any argument) may repeat without consuming budget; the `STARTTLS`
/// line itself is matched byte-exact including the terminator.
pub fn negotiate_smtp(
    io: &mut impl SessionStream,
    timeout: Duration,
    log_prefix: &LogPrefix,
) -> Result<Outcome, Error> {
    info!("{} Initiating SMTP STARTTLS sequence", log_prefix);

    io.write_all(GREETING)?;
    io.flush()?;

    let mut attempt = 0;
    while attempt < MAX_ATTEMPTS {
        let chunk = io.read_chunk(timeout)?;
        if chunk.starts_with(EHLO_PREFIX) {
            for line in EHLO_RESPONSE {
                io.write_all(line)?;
            }
            io.flush()?;
        } else if chunk == STARTTLS {
            io.write_all(GO_AHEAD)?;
            io.flush()?;
            info!("{} SMTP STARTTLS sequence completed", log_prefix);
            return Ok(Outcome::Ready);
        } else {
            attempt += 1;
        }
    }

    warn!("{} Unexpected STARTTLS sequence", log_prefix);
    Ok(Outcome::Failed)
}
