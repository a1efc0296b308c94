//! Client errors.

use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong talking to an IMAP server.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket read or write failed, including an unexpected close.
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or record failure.
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    /// The host is not usable as a TLS server name.
    #[error("host is not a valid server name: {0}")]
    ServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// `LOGIN` was refused.
    #[error("login rejected: {0}")]
    Auth(String),

    /// Tagged `NO`.
    #[error("server refused command: {0}")]
    No(String),

    /// Tagged `BAD`.
    #[error("server rejected command syntax: {0}")]
    Bad(String),

    /// `BYE`; the server is closing the session.
    #[error("server closed the session: {0}")]
    Bye(String),

    /// No reply within the configured timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Reply the client could not make sense of.
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

impl Error {
    /// True when the session cannot carry further commands.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Timeout(_)
        )
    }
}

/// `Result` with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        let eof = Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(eof.is_session_fatal());
        assert!(Error::Bye("shutting down".into()).is_session_fatal());
        assert!(Error::Timeout(Duration::from_secs(5)).is_session_fatal());
    }

    #[test]
    fn test_command_errors_leave_session_usable() {
        for err in [
            Error::No("mailbox busy".into()),
            Error::Bad("parse error".into()),
            Error::Auth("invalid credentials".into()),
            Error::Protocol("bad literal".into()),
        ] {
            assert!(!err.is_session_fatal(), "{err}");
        }
    }

    #[test]
    fn test_messages_carry_server_text() {
        assert_eq!(
            Error::Auth("[AUTHENTICATIONFAILED] nope".into()).to_string(),
            "login rejected: [AUTHENTICATIONFAILED] nope"
        );
        assert_eq!(
            Error::Timeout(Duration::from_secs(30)).to_string(),
            "no reply within 30s"
        );
    }
}
