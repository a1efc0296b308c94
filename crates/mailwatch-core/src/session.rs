//! Mailbox session seam.
//!
//! The poll cycle talks to the mailbox only through [`MailboxConnector`] and
//! [`MailboxSession`], so the wire client can be swapped for an in-memory
//! fake in tests.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use mailwatch_mime::{Message, extract_address, parse_date};

use crate::Result;
use crate::params::PollConfig;

/// Address and secret used to open a mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Login address.
    pub address: String,
    /// App password or equivalent.
    pub secret: String,
}

impl Credential {
    /// Creates a credential.
    #[must_use]
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Time range searched by one cycle.
///
/// Computed once when the cycle starts; every search in the cycle uses the
/// same bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end (the cycle's "now").
    pub end: DateTime<Utc>,
    /// Window length in hours.
    pub effective_hours: u32,
}

impl SearchWindow {
    /// Returns the window of the configured length that ends at `now`.
    #[must_use]
    pub fn ending_at(now: DateTime<Utc>, config: &PollConfig) -> Self {
        let effective_hours = config.effective_hours();
        Self {
            start: now - ChronoDuration::hours(i64::from(effective_hours)),
            end: now,
            effective_hours,
        }
    }

    /// Returns true if the timestamp lies within the window.
    #[must_use]
    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        let at = at.with_timezone(&Utc);
        self.start <= at && at <= self.end
    }
}

/// Opaque reference to a message inside an open session (an IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageHandle(pub u32);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as seen by the match engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMessage {
    /// Handle the message was fetched with.
    pub handle: MessageHandle,
    /// Raw `From` header, encoded words decoded.
    pub raw_sender: String,
    /// Bare lower-cased sender address.
    pub sender_address: String,
    /// Decoded subject.
    pub subject: String,
    /// Plain-text body; empty until content is fetched.
    pub body_text: String,
    /// Raw `Date` header.
    pub raw_date: String,
    /// Parsed `Date` header.
    pub received_at: Option<DateTime<FixedOffset>>,
    /// `Message-ID` header.
    pub message_id: String,
}

impl CandidateMessage {
    /// Builds a candidate from a raw header block (or full message).
    #[must_use]
    pub fn from_headers(handle: MessageHandle, raw: &[u8]) -> Self {
        let message = Message::parse(raw);
        let raw_sender = message
            .headers
            .decoded("from")
            .unwrap_or_default()
            .trim()
            .to_string();
        let raw_date = message.date().unwrap_or_default().trim().to_string();

        Self {
            handle,
            sender_address: extract_address(&raw_sender),
            subject: message.subject().unwrap_or_default().trim().to_string(),
            body_text: String::new(),
            received_at: parse_date(&raw_date),
            raw_date,
            message_id: message.message_id().unwrap_or_default().trim().to_string(),
            raw_sender,
        }
    }
}

/// Opens sessions against one kind of mailbox.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connects and authenticates.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Auth`] when the credential is rejected,
    /// [`crate::Error::Connection`] or [`crate::Error::Timeout`] otherwise.
    async fn open(&self, credential: &Credential) -> Result<Box<dyn MailboxSession>>;
}

/// One open mailbox connection, used for exactly one cycle.
#[async_trait]
pub trait MailboxSession: Send {
    /// Returns handles of messages within the window, optionally narrowed
    /// to the given senders, in ascending (oldest first) order.
    async fn search(
        &mut self,
        window: &SearchWindow,
        senders: &[String],
    ) -> Result<Vec<MessageHandle>>;

    /// Fetches a message's headers.
    async fn fetch(&mut self, handle: MessageHandle) -> Result<CandidateMessage>;

    /// Fetches the full message and reduces it to plain text.
    async fn fetch_content(&mut self, handle: MessageHandle) -> Result<String>;

    /// Closes the session. Failures are logged, never returned.
    async fn close(&mut self);
}
