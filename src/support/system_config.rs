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

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The system-wide configuration for Opportune.
///
/// This is stored in a file named `opportune.toml` under the Opportune system
/// root, which is typically `/usr/local/etc/opportune` or `/etc/opportune`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Configuration for TLS.
    pub tls: TlsConfig,

    /// Configuration for the plaintext STARTTLS phase.
    ///
    /// The defaults are reasonable for most installations.
    #[serde(default)]
    pub starttls: StartTlsConfig,
}

// The Default implementation of TlsConfig is not useful in the real world,
// but is helpful for tests.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct TlsConfig {
    /// The path to the TLS private key, which must be in PEM format.
    pub private_key: PathBuf,
    /// The path to the TLS certificate chain, which must be in PEM format.
    pub certificate_chain: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StartTlsConfig {
    /// How long to wait for the peer's next message, in milliseconds, before
    /// treating the exchange as a non-match.
    ///
    /// The number of non-matching exchanges tolerated before the handshake
    /// is declared failed is a fixed protocol property and is deliberately
    /// not configurable.
    pub read_timeout_ms: u64,
}

impl StartTlsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for StartTlsConfig {
    fn default() -> Self {
        StartTlsConfig {
            read_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let config: SystemConfig = toml::from_str(
            r#"
[tls]
private_key = "tls/key.pem"
certificate_chain = "tls/chain.pem"
"#,
        )
        .unwrap();

        assert_eq!(
            PathBuf::from("tls/key.pem"),
            config.tls.private_key,
        );
        assert_eq!(5000, config.starttls.read_timeout_ms);
    }

    #[test]
    fn timeout_override_parses() {
        let config: SystemConfig = toml::from_str(
            r#"
[tls]
private_key = "k"
certificate_chain = "c"

[starttls]
read_timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(Duration::from_millis(250), config.starttls.read_timeout());
    }
}
