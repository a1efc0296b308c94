//! IMAP connection management.
//!
//! - Configuration (host, port, security mode, timeouts)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for IMAP protocol
//! - Command-at-a-time client

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Client, connect};
pub use config::{Config, Security};
pub use framed::FramedStream;
pub(crate) use framed::parse_literal_length;
pub use stream::ImapStream;
