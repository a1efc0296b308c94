//! Where and how to connect.

use std::time::Duration;

/// Transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Cleartext TCP. Local test servers only.
    Plain,
    /// TLS from the first byte.
    #[default]
    Tls,
}

impl Security {
    /// Well-known port for the mode.
    #[must_use]
    pub const fn well_known_port(self) -> u16 {
        match self {
            Self::Plain => 143,
            Self::Tls => 993,
        }
    }
}

/// Server endpoint and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host name, also used as the TLS server name.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
    /// Bound on TCP connect, TLS handshake and greeting together.
    pub connect_timeout: Duration,
    /// Bound on each command round trip.
    pub io_timeout: Duration,
}

impl Config {
    /// TLS on 993 with a 30 s connect and 60 s command timeout.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Security::Tls.well_known_port(),
            security: Security::Tls,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Switches security mode, moving the port along if it was the old
    /// mode's well-known one.
    #[must_use]
    pub const fn with_security(mut self, security: Security) -> Self {
        if self.port == self.security.well_known_port() {
            self.port = security.well_known_port();
        }
        self.security = security;
        self
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides both timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}
