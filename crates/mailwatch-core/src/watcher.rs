//! Caller-facing entry points for one mailbox credential.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use crate::cache::{CacheStatus, SharedCache};
use crate::filter::FilterSet;
use crate::monitor::{CycleJob, Monitor, MonitorStatus, StartOutcome};
use crate::params::{PollConfig, PollParams};
use crate::poll::{CycleOutcome, CycleStatus, Degradation};
use crate::response::{CheckResponse, build_response};
use crate::session::{Credential, MailboxConnector};
use crate::Result;

/// Reported alongside the first response when background mode was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorStarted {
    /// Interval of the running monitor.
    pub check_interval_seconds: u32,
    /// False if a monitor was already running or could not be started.
    pub monitoring_started: bool,
}

/// Response of [`MailWatcher::invoke`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvokeResponse {
    /// The cycle run for this call.
    #[serde(flatten)]
    pub check: CheckResponse,
    /// Present when `background_mode` was requested.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorStarted>,
}

/// Checks one mailbox on demand or in the background.
///
/// Foreground checks and monitor cycles share one cache and never overlap
/// on it.
pub struct MailWatcher {
    connector: Arc<dyn MailboxConnector>,
    credential: Credential,
    cache: SharedCache,
    default_filters: FilterSet,
    defaults: PollConfig,
    monitor: Monitor,
}

impl MailWatcher {
    /// Creates a watcher with no default filters and built-in defaults.
    #[must_use]
    pub fn new(connector: Arc<dyn MailboxConnector>, credential: Credential, cache: SharedCache) -> Self {
        Self {
            connector,
            credential,
            cache,
            default_filters: FilterSet::default(),
            defaults: PollConfig::default(),
            monitor: Monitor::new(),
        }
    }

    /// Filters used when a request carries no `email_filters`.
    #[must_use]
    pub fn with_default_filters(mut self, filters: FilterSet) -> Self {
        self.default_filters = filters;
        self
    }

    /// Values used for parameters a request leaves out, clamped into range.
    #[must_use]
    pub fn with_defaults(mut self, defaults: PollConfig) -> Self {
        self.defaults = defaults.clamped();
        self
    }

    /// Login address of the watched mailbox.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.credential.address
    }

    /// Runs one cycle.
    ///
    /// Always returns a successful response; malformed arguments fall back
    /// to defaults and malformed filters produce an empty result.
    pub async fn check(&self, args: &Value) -> CheckResponse {
        let params = PollParams::from_value_with(args, &self.defaults);
        self.check_normalized(args, &params.config).await
    }

    /// Tool-style entry point.
    ///
    /// With `background_mode` false this is [`MailWatcher::check`]. With it
    /// true the monitor is started and the response carries its first
    /// cycle. If a monitor is already running, one foreground cycle runs
    /// instead and `monitoring_started` is false.
    pub async fn invoke(&self, args: &Value) -> InvokeResponse {
        let params = PollParams::from_value_with(args, &self.defaults);
        if !params.background_mode {
            return InvokeResponse {
                check: self.check_normalized(args, &params.config).await,
                monitor: None,
            };
        }

        let job = match self.job(args, params.config) {
            Ok(job) => job,
            Err(e) => {
                return InvokeResponse {
                    check: self.rejected(&e, &params.config).await,
                    monitor: Some(MonitorStarted {
                        check_interval_seconds: params.config.check_interval_seconds,
                        monitoring_started: false,
                    }),
                };
            }
        };

        match self.monitor.start(job.clone()).await {
            StartOutcome::Started(check) => InvokeResponse {
                check,
                monitor: Some(MonitorStarted {
                    check_interval_seconds: params.config.check_interval_seconds,
                    monitoring_started: true,
                }),
            },
            StartOutcome::AlreadyRunning => InvokeResponse {
                check: job.run_once().await,
                monitor: Some(MonitorStarted {
                    check_interval_seconds: self
                        .monitor
                        .status()
                        .check_interval_seconds
                        .unwrap_or(params.config.check_interval_seconds),
                    monitoring_started: false,
                }),
            },
        }
    }

    /// Starts background monitoring with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if `email_filters` is malformed;
    /// the monitor is not started.
    pub async fn start_monitoring(&self, args: &Value) -> Result<StartOutcome> {
        let params = PollParams::from_value_with(args, &self.defaults);
        let job = self.job(args, params.config)?;
        Ok(self.monitor.start(job).await)
    }

    /// Stops background monitoring. Returns false if it was not running.
    pub async fn stop_monitoring(&self) -> bool {
        self.monitor.stop().await
    }

    /// Describes the monitor.
    #[must_use]
    pub fn monitor_status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    /// Latest monitor cycle result.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CheckResponse>>> {
        self.monitor.subscribe()
    }

    /// Describes the dedup cache.
    pub async fn cache_status(&self) -> CacheStatus {
        let mut cache = self.cache.lock().await;
        cache.load();
        cache.status()
    }

    async fn check_normalized(&self, args: &Value, config: &PollConfig) -> CheckResponse {
        match self.job(args, *config) {
            Ok(job) => job.run_once().await,
            Err(e) => self.rejected(&e, config).await,
        }
    }

    fn job(&self, args: &Value, config: PollConfig) -> Result<CycleJob> {
        let filters = match args.get("email_filters") {
            None | Some(Value::Null) => self.default_filters.clone(),
            Some(value) => FilterSet::from_value(value)?,
        };
        Ok(CycleJob {
            connector: Arc::clone(&self.connector),
            credential: self.credential.clone(),
            filters,
            config,
            cache: Arc::clone(&self.cache),
        })
    }

    async fn rejected(&self, error: &crate::Error, config: &PollConfig) -> CheckResponse {
        warn!(address = %self.credential.address, error = %error, "ignoring request with invalid filters");
        let cache_size = {
            let mut cache = self.cache.lock().await;
            cache.load();
            cache.size()
        };
        build_response(&CycleOutcome::trivial(
            CycleStatus::NoMatchDegraded(Degradation::InvalidFilters),
            config,
            0,
            cache_size,
        ))
    }
}
