//! One poll cycle: open, search, filter, dedupe, fetch, record, close.
//!
//! A cycle never fails. Every problem is folded into the returned
//! [`CycleOutcome`], which distinguishes a clean empty result from one that
//! is empty because the mailbox could not be checked.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, SharedCache};
use crate::error::ErrorKind;
use crate::filter::{Fingerprint, FilterSet, MatchedMessage, match_candidate};
use crate::params::PollConfig;
use crate::session::{Credential, MailboxConnector, MailboxSession, SearchWindow};
use crate::Error;

/// Why a cycle could not fully check the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// Credentials were rejected.
    Auth,
    /// The server could not be reached or dropped the connection.
    Connection,
    /// The server did not answer in time.
    Timeout,
    /// The server rejected the search.
    Search,
    /// The filter argument was malformed.
    InvalidFilters,
}

impl Degradation {
    /// Short label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Search => "search",
            Self::InvalidFilters => "invalid_filters",
        }
    }

    fn of(error: &Error) -> Self {
        match error {
            Error::Auth(_) => Self::Auth,
            Error::Timeout(_) => Self::Timeout,
            Error::Validation(_) => Self::InvalidFilters,
            e if e.kind() == ErrorKind::Connection => Self::Connection,
            _ => Self::Search,
        }
    }
}

/// Internal result classification, collapsed only by the response builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// At least one new match.
    Matched,
    /// The mailbox was checked (or there was nothing to check) and nothing
    /// new matched.
    NoMatchClean,
    /// Nothing matched because the check did not complete.
    NoMatchDegraded(Degradation),
}

/// Whether the cycle reached the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A session was opened.
    Ok,
    /// No session was needed.
    Skipped,
    /// Opening or using the session failed.
    Failed,
}

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Classification.
    pub status: CycleStatus,
    /// New matches, in mailbox order.
    pub matches: Vec<MatchedMessage>,
    /// Handles examined.
    pub emails_checked: usize,
    /// Messages skipped because they could not be fetched.
    pub fetch_failures: usize,
    /// Cache size after the cycle.
    pub cache_size: usize,
    /// Number of sender rules.
    pub filters_applied: usize,
    /// Configuration the cycle ran with.
    pub config: PollConfig,
    /// Window searched, when a search was attempted.
    pub window: Option<SearchWindow>,
    /// Whether the mailbox was reached.
    pub connection: ConnectionStatus,
    /// When the cycle completed.
    pub check_time: DateTime<Utc>,
}

impl CycleOutcome {
    /// An outcome for a cycle that never reached the mailbox.
    #[must_use]
    pub fn trivial(
        status: CycleStatus,
        config: &PollConfig,
        filters_applied: usize,
        cache_size: usize,
    ) -> Self {
        let connection = match status {
            CycleStatus::NoMatchDegraded(Degradation::InvalidFilters) | CycleStatus::NoMatchClean => {
                ConnectionStatus::Skipped
            }
            _ => ConnectionStatus::Failed,
        };
        Self {
            status,
            matches: Vec::new(),
            emails_checked: 0,
            fetch_failures: 0,
            cache_size,
            filters_applied,
            config: *config,
            window: None,
            connection,
            check_time: Utc::now(),
        }
    }
}

/// Inputs of one cycle.
pub struct PollCycle<'a> {
    /// Opens the mailbox.
    pub connector: &'a dyn MailboxConnector,
    /// Mailbox credential.
    pub credential: &'a Credential,
    /// Sender/subject rules.
    pub filters: &'a FilterSet,
    /// Normalized configuration.
    pub config: &'a PollConfig,
    /// Dedup cache for this credential.
    pub cache: &'a SharedCache,
}

impl PollCycle<'_> {
    /// Runs the cycle with the window ending now.
    pub async fn run(&self) -> CycleOutcome {
        self.run_at(Utc::now()).await
    }

    /// Runs the cycle with the window ending at `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let filters_applied = self.filters.len();

        if self.filters.is_empty() {
            debug!("no filters, skipping mailbox check");
            let cache_size = self.loaded_cache_size().await;
            return CycleOutcome::trivial(
                CycleStatus::NoMatchClean,
                self.config,
                filters_applied,
                cache_size,
            );
        }

        let window = SearchWindow::ending_at(now, self.config);
        let mut session = match self.connector.open(self.credential).await {
            Ok(session) => session,
            Err(e) => {
                let degradation = Degradation::of(&e);
                error!(
                    address = %self.credential.address,
                    degraded = degradation.as_str(),
                    error = %e,
                    "could not open mailbox, reporting no matches"
                );
                let cache_size = self.loaded_cache_size().await;
                let mut outcome = CycleOutcome::trivial(
                    CycleStatus::NoMatchDegraded(degradation),
                    self.config,
                    filters_applied,
                    cache_size,
                );
                outcome.window = Some(window);
                return outcome;
            }
        };

        let mut cache = self.cache.lock().await;
        cache.load();

        let scan = self.scan(session.as_mut(), &window, &**cache).await;

        for fingerprint in scan.staged {
            cache.add(fingerprint);
        }
        if let Err(e) = cache.persist() {
            warn!(error = %e, "could not persist cache");
        }
        let cache_size = cache.size();
        drop(cache);

        session.close().await;

        let status = if !scan.matches.is_empty() {
            CycleStatus::Matched
        } else if let Some(degradation) = scan.degraded {
            CycleStatus::NoMatchDegraded(degradation)
        } else {
            CycleStatus::NoMatchClean
        };
        let connection = match scan.degraded {
            Some(Degradation::Connection | Degradation::Timeout) => ConnectionStatus::Failed,
            _ => ConnectionStatus::Ok,
        };

        info!(
            checked = scan.emails_checked,
            matched = scan.matches.len(),
            fetch_failures = scan.fetch_failures,
            cache_size,
            period = %self.config.search_period(),
            "poll cycle complete"
        );

        CycleOutcome {
            status,
            matches: scan.matches,
            emails_checked: scan.emails_checked,
            fetch_failures: scan.fetch_failures,
            cache_size,
            filters_applied,
            config: *self.config,
            window: Some(window),
            connection,
            check_time: Utc::now(),
        }
    }

    async fn loaded_cache_size(&self) -> usize {
        let mut cache = self.cache.lock().await;
        cache.load();
        cache.size()
    }

    async fn scan(
        &self,
        session: &mut dyn MailboxSession,
        window: &SearchWindow,
        cache: &dyn CacheStore,
    ) -> Scan {
        let mut scan = Scan::default();

        let mut handles = match session.search(window, &self.filters.senders()).await {
            Ok(handles) => handles,
            Err(e) => {
                let degradation = Degradation::of(&e);
                warn!(degraded = degradation.as_str(), error = %e, "search failed");
                scan.degraded = Some(degradation);
                return scan;
            }
        };

        handles.sort_unstable();
        handles.dedup();
        let cap = self.config.max_messages as usize;
        if handles.len() > cap {
            debug!(found = handles.len(), cap, "keeping most recent messages");
            handles = handles.split_off(handles.len() - cap);
        }

        for handle in handles {
            scan.emails_checked += 1;

            let candidate = match session.fetch(handle).await {
                Ok(candidate) => candidate,
                Err(e) if e.kind() == ErrorKind::Connection => {
                    warn!(uid = handle.0, error = %e, "connection lost while fetching");
                    scan.degraded = Some(Degradation::of(&e));
                    break;
                }
                Err(e) => {
                    warn!(uid = handle.0, error = %e, "skipping message");
                    scan.fetch_failures += 1;
                    continue;
                }
            };

            if candidate
                .received_at
                .is_some_and(|at| !window.contains(&at))
            {
                debug!(uid = handle.0, date = %candidate.raw_date, "outside window");
                continue;
            }

            let Some(mut matched) = match_candidate(&candidate, self.filters) else {
                continue;
            };

            if scan.staged.contains(&matched.fingerprint)
                || (self.config.use_cache && cache.contains(&matched.fingerprint))
            {
                debug!(uid = handle.0, email_id = %matched.fingerprint, "already seen");
                continue;
            }

            match session.fetch_content(handle).await {
                Ok(content) => matched.candidate.body_text = content,
                Err(e) if e.kind() == ErrorKind::Connection => {
                    warn!(uid = handle.0, error = %e, "connection lost while fetching content");
                    scan.degraded = Some(Degradation::of(&e));
                    break;
                }
                Err(e) => {
                    warn!(uid = handle.0, error = %e, "skipping message");
                    scan.fetch_failures += 1;
                    continue;
                }
            }

            debug!(
                uid = handle.0,
                sender = %matched.matched_sender_filter,
                subjects = ?matched.matched_subject_filters,
                "matched"
            );
            scan.staged.push(matched.fingerprint.clone());
            scan.matches.push(matched);
        }

        scan
    }
}

#[derive(Default)]
struct Scan {
    matches: Vec<MatchedMessage>,
    staged: Vec<Fingerprint>,
    emails_checked: usize,
    fetch_failures: usize,
    degraded: Option<Degradation>,
}

/// Runs one cycle with the window ending now.
pub async fn run_cycle(
    connector: &dyn MailboxConnector,
    credential: &Credential,
    filters: &FilterSet,
    config: &PollConfig,
    cache: &SharedCache,
) -> CycleOutcome {
    PollCycle {
        connector,
        credential,
        filters,
        config,
        cache,
    }
    .run()
    .await
}
