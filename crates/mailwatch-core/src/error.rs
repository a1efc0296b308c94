//! Failures inside a poll cycle.
//!
//! None of these reach callers of [`crate::MailWatcher::check`]; the poll
//! cycle absorbs them into a degraded outcome. They exist so the cycle can
//! classify what went wrong and so the connector and cache seams stay
//! testable.

use std::time::Duration;

use thiserror::Error;

/// Why a cycle, or one step of it, failed.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected by the server.
    #[error("mailbox login rejected: {0}")]
    Auth(String),

    /// Network, TLS, or protocol failure on the mailbox connection.
    #[error("mailbox unreachable: {0}")]
    Connection(String),

    /// An operation exceeded its deadline.
    #[error("mailbox did not answer within {0:?}")]
    Timeout(Duration),

    /// A single message could not be retrieved.
    #[error("could not fetch uid {uid}: {reason}")]
    Fetch {
        /// UID of the message.
        uid: u32,
        /// Underlying failure.
        reason: String,
    },

    /// Malformed filter structure.
    #[error("malformed email_filters: {0}")]
    Validation(String),

    /// Cache store could not be read or written.
    #[error("seen-cache file: {0}")]
    CacheIo(#[from] std::io::Error),

    /// Cache store content is not valid.
    #[error("seen-cache contents: {0}")]
    CacheFormat(#[from] serde_json::Error),

    /// Unusable settings.
    #[error("settings: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential rejected.
    Auth,
    /// Network or timeout.
    Connection,
    /// Single-message retrieval.
    Fetch,
    /// Malformed filters.
    Validation,
    /// Cache store.
    Cache,
    /// Configuration.
    Config,
}

impl Error {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Connection(_) | Self::Timeout(_) => ErrorKind::Connection,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Validation(_) => ErrorKind::Validation,
            Self::CacheIo(_) | Self::CacheFormat(_) => ErrorKind::Cache,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Converts a wire-client error raised while opening or using a session.
    pub(crate) fn from_imap(error: mailwatch_imap::Error) -> Self {
        use mailwatch_imap::Error as Imap;

        match error {
            Imap::Auth(text) => Self::Auth(text),
            Imap::Timeout(after) => Self::Timeout(after),
            other => Self::Connection(other.to_string()),
        }
    }
}

/// `Result` with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
