//! Mailbox connectors.
//!
//! Bridges the session traits to the wire client.

pub mod imap;

pub use imap::ImapConnector;
