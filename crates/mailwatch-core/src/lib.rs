//! # mailwatch-core
//!
//! Mailbox polling engine for `mailwatch`.
//!
//! This crate provides:
//! - Parameter normalization that never fails
//! - Sender/subject filtering with stable message fingerprints
//! - A durable dedup cache of seen messages
//! - One-shot poll cycles against an IMAP mailbox
//! - A background monitor that repeats the cycle on an interval
//! - A single success-shaped response for every outcome
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailwatch_core::{Credential, MailWatcher, WatchConfig, shared};
//!
//! let config = WatchConfig::load(&WatchConfig::default_path()?)?;
//! let watcher = MailWatcher::new(
//!     Arc::new(config.connector()?),
//!     Credential::new(&config.address, secret),
//!     shared(config.cache_store()?),
//! )
//! .with_default_filters(config.filters())
//! .with_defaults(config.defaults);
//!
//! let response = watcher.check(&serde_json::json!({"time_window_hours": 6})).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
mod error;
pub mod filter;
pub mod monitor;
pub mod params;
pub mod poll;
pub mod response;
pub mod service;
pub mod session;
pub mod watcher;

pub use cache::{CacheStatus, CacheStore, JsonFileCache, MemoryCache, SharedCache, shared};
pub use config::{ImapSettings, SecurityMode, WatchConfig, detect_imap_host};
pub use error::{Error, ErrorKind, Result};
pub use filter::{FilterMatch, FilterSet, Fingerprint, MatchedMessage, match_candidate};
pub use monitor::{CycleJob, Monitor, MonitorPhase, MonitorStatus, StartOutcome};
pub use params::{PollConfig, PollParams};
pub use poll::{ConnectionStatus, CycleOutcome, CycleStatus, Degradation, PollCycle, run_cycle};
pub use response::{CheckResponse, MatchedEmail, Statistics, build_response};
pub use service::ImapConnector;
pub use session::{
    CandidateMessage, Credential, MailboxConnector, MailboxSession, MessageHandle, SearchWindow,
};
pub use watcher::{InvokeResponse, MailWatcher, MonitorStarted};
