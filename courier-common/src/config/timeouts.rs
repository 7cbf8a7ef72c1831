//! Timeouts applied by the SMTP transport while talking to a relay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side SMTP timeouts.
///
/// Shorter than the RFC 5321 server recommendations; the transport is
/// usually called from inside a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Establishing the TCP (and, for implicit TLS, the TLS) connection.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Greeting, EHLO and STARTTLS.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// AUTH exchange.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub auth_secs: u64,

    /// MAIL FROM and each RCPT TO.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub envelope_secs: u64,

    /// DATA, the payload and the final dot.
    ///
    /// Default: 120 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// QUIT. A timeout here never fails a send.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            auth_secs: defaults::command_secs(),
            envelope_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    #[must_use]
    pub const fn envelope(&self) -> Duration {
        Duration::from_secs(self.envelope_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn command_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120 // 2 minutes
    }
    pub const fn quit_secs() -> u64 {
        10
    }
}
