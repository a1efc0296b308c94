//! Background monitor.
//!
//! `Idle -> Running -> Stopping -> Idle`. Starting runs one cycle before
//! returning, then a task repeats the cycle every interval. Stopping
//! cancels the wait immediately but lets an in-flight cycle finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::SharedCache;
use crate::filter::FilterSet;
use crate::params::PollConfig;
use crate::poll::PollCycle;
use crate::response::{CheckResponse, build_response};
use crate::session::{Credential, MailboxConnector};

/// Everything needed to run a cycle, owned so it can move into a task.
#[derive(Clone)]
pub struct CycleJob {
    /// Opens the mailbox.
    pub connector: Arc<dyn MailboxConnector>,
    /// Mailbox credential.
    pub credential: Credential,
    /// Sender/subject rules.
    pub filters: FilterSet,
    /// Normalized configuration.
    pub config: PollConfig,
    /// Dedup cache for this credential.
    pub cache: SharedCache,
}

impl CycleJob {
    /// Runs one cycle and builds the response.
    pub async fn run_once(&self) -> CheckResponse {
        let outcome = PollCycle {
            connector: self.connector.as_ref(),
            credential: &self.credential,
            filters: &self.filters,
            config: &self.config,
            cache: &self.cache,
        }
        .run()
        .await;
        build_response(&outcome)
    }
}

impl std::fmt::Debug for CycleJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleJob")
            .field("credential", &self.credential)
            .field("filters", &self.filters)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Monitor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// Not running.
    Idle,
    /// Cycling on the interval.
    Running,
    /// Stop requested, waiting for the task to finish.
    Stopping,
}

/// Result of [`Monitor::start`].
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// Started; carries the first cycle's response.
    Started(CheckResponse),
    /// A monitor was already running; nothing changed.
    AlreadyRunning,
}

/// Snapshot of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    /// Current phase.
    pub phase: MonitorPhase,
    /// Cycles completed since the monitor was created.
    pub cycles_completed: u64,
    /// Completion time of the latest cycle.
    pub last_check_time: Option<DateTime<Utc>>,
    /// Interval of the current run.
    pub check_interval_seconds: Option<u32>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    latest: watch::Sender<Option<Arc<CheckResponse>>>,
    phase: watch::Sender<MonitorPhase>,
    cycles: AtomicU64,
    interval_seconds: AtomicU32,
}

impl Shared {
    fn publish(&self, response: CheckResponse) -> Arc<CheckResponse> {
        let response = Arc::new(response);
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.latest.send_replace(Some(Arc::clone(&response)));
        response
    }
}

/// Marks the monitor running for the first cycle of `start`. Dropped
/// without [`PendingStart::commit`], as when the `start` future is
/// cancelled, it puts the monitor back to idle.
struct PendingStart<'a> {
    shared: &'a Shared,
    committed: bool,
}

impl<'a> PendingStart<'a> {
    fn begin(shared: &'a Shared, interval_seconds: u32) -> Self {
        shared.phase.send_replace(MonitorPhase::Running);
        shared.interval_seconds.store(interval_seconds, Ordering::Relaxed);
        Self {
            shared,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!("monitor start abandoned during the first cycle");
            self.shared.interval_seconds.store(0, Ordering::Relaxed);
            self.shared.phase.send_replace(MonitorPhase::Idle);
        }
    }
}

/// Runs cycles on an interval until stopped.
pub struct Monitor {
    transitions: Mutex<Option<Running>>,
    shared: Arc<Shared>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// Creates an idle monitor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transitions: Mutex::new(None),
            shared: Arc::new(Shared {
                latest: watch::Sender::new(None),
                phase: watch::Sender::new(MonitorPhase::Idle),
                cycles: AtomicU64::new(0),
                interval_seconds: AtomicU32::new(0),
            }),
        }
    }

    /// Starts monitoring.
    ///
    /// The first cycle runs before this returns; later cycles run every
    /// `job.config.check_interval_seconds`. If the monitor is already
    /// running nothing changes.
    pub async fn start(&self, job: CycleJob) -> StartOutcome {
        let mut running = self.transitions.lock().await;
        if running.is_some() {
            debug!("monitor already running");
            return StartOutcome::AlreadyRunning;
        }

        let interval = job.config.check_interval();
        let mut pending = PendingStart::begin(&self.shared, job.config.check_interval_seconds);
        info!(interval_secs = interval.as_secs(), "monitor starting");

        let first = self.shared.publish(job.run_once().await);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            job,
            interval,
            cancel.clone(),
            Arc::clone(&self.shared),
        ));
        *running = Some(Running { cancel, task });
        pending.commit();

        StartOutcome::Started(first.as_ref().clone())
    }

    /// Stops monitoring and waits for the task to end.
    ///
    /// Returns false if the monitor was not running.
    pub async fn stop(&self) -> bool {
        let mut running = self.transitions.lock().await;
        let Some(Running { cancel, task }) = running.take() else {
            return false;
        };

        self.shared.phase.send_replace(MonitorPhase::Stopping);
        cancel.cancel();
        if let Err(e) = task.await {
            error!(error = %e, "monitor task ended abnormally");
        }

        self.shared.interval_seconds.store(0, Ordering::Relaxed);
        self.shared.phase.send_replace(MonitorPhase::Idle);
        info!("monitor stopped");
        true
    }

    /// Returns true while the monitor is running or stopping.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.shared.phase.borrow() != MonitorPhase::Idle
    }

    /// Describes the monitor.
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        let interval = self.shared.interval_seconds.load(Ordering::Relaxed);
        MonitorStatus {
            phase: *self.shared.phase.borrow(),
            cycles_completed: self.shared.cycles.load(Ordering::Relaxed),
            last_check_time: self.shared.latest.borrow().as_ref().map(|r| r.check_time),
            check_interval_seconds: (interval > 0).then_some(interval),
        }
    }

    /// Receives every cycle's response as it completes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CheckResponse>>> {
        self.shared.latest.subscribe()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(running) = self.transitions.get_mut() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(job: CycleJob, interval: Duration, cancel: CancellationToken, shared: Arc<Shared>) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        let response = shared.publish(job.run_once().await);
        debug!(matched = response.total_matched, "monitor cycle complete");
    }
    debug!("monitor loop exited");
}
