//! # mailwatch-imap
//!
//! A small async IMAP4rev1 client covering exactly what a mailbox poller
//! needs: connect over TLS, LOGIN, SELECT, `UID SEARCH` by date and sender,
//! `UID FETCH` with `BODY.PEEK`, and LOGOUT.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwatch_imap::{Config, FetchSection, SearchQuery, connect};
//!
//! let mut client = connect(&Config::new("imap.example.com")).await?;
//! client.login("me@example.com", "app-password").await?;
//! client.select("INBOX").await?;
//!
//! let query = SearchQuery::since(since).before(until).from_any(["billing@example.com"]);
//! for uid in client.uid_search(&query).await? {
//!     let header = client.uid_fetch(uid, FetchSection::Header).await?;
//! }
//! client.logout().await?;
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command serialization and search criteria
//! - [`connection`]: streams, framing and the client
//! - [`response`]: sans-I/O parsing of the responses the client reads

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, FetchSection, SearchQuery, TagGenerator, imap_date};
pub use connection::{Client, Config, FramedStream, ImapStream, Security, connect};
pub use error::{Error, Result};
