//! Refresh controller: owns the filter configuration and the snapshot.
//!
//! The controller runs as a single tokio task. It is the only code that
//! assigns a new snapshot; everything else reads the published
//! [`DashboardState`] through a `watch` channel, which swaps the whole value
//! at once.
//!
//! Fetches run in their own tasks and may complete in any order. Each one
//! carries a [`FetchTicket`]: the configuration generation it was issued
//! under plus a sequence number. A completion is applied only when its
//! generation is current and it is newer than the last applied result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::errors::SeismodashError;
use crate::models::{SeismicEvent, Snapshot};
use crate::query::{FilterConfig, QuerySpec, build_query};

/// Default time between scheduled refreshes.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Capacity of the command queue.
const COMMAND_BUFFER: usize = 16;

/// Something that can execute a feed query.
pub trait EventSource: Send + Sync + 'static {
    fn fetch_events(
        &self,
        query: &QuerySpec,
    ) -> impl Future<Output = Result<Vec<SeismicEvent>, SeismodashError>> + Send;
}

/// Loading state of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Idle,
    Fetching,
    Ready,
    Failed,
}

/// Everything the controller publishes after each transition.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub status: RefreshStatus,
    pub config: FilterConfig,
    pub snapshot: Snapshot,
    /// Incremented on every configuration change
    pub generation: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Completions dropped because a newer config or result superseded them
    pub stale_discarded: u64,
}

impl DashboardState {
    fn initial(config: FilterConfig) -> Self {
        Self {
            status: RefreshStatus::Idle,
            config,
            snapshot: Snapshot::empty(),
            generation: 0,
            last_updated: None,
            last_error: None,
            stale_discarded: 0,
        }
    }
}

/// Identifies one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub sequence: u64,
}

/// Why a fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Startup,
    ConfigChange,
    Timer,
    Manual,
}

#[derive(Debug)]
enum Command {
    SetConfig(FilterConfig),
    Refresh,
    Shutdown,
}

struct FetchOutcome {
    ticket: FetchTicket,
    result: Result<Vec<SeismicEvent>, SeismodashError>,
}

/// Cloneable handle for driving and observing a running controller.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Arc<DashboardState>>,
}

impl RefreshHandle {
    /// Replace the filter configuration and start a new fetch cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has shut down.
    pub async fn set_config(&self, config: FilterConfig) -> Result<(), ControllerStopped> {
        self.send(Command::SetConfig(config)).await
    }

    /// Fetch again with the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has shut down.
    pub async fn refresh(&self) -> Result<(), ControllerStopped> {
        self.send(Command::Refresh).await
    }

    /// Stop the controller. In-flight fetches are abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller has already shut down.
    pub async fn shutdown(&self) -> Result<(), ControllerStopped> {
        self.send(Command::Shutdown).await
    }

    /// The most recently published state.
    #[must_use]
    pub fn state(&self) -> Arc<DashboardState> {
        self.state.borrow().clone()
    }

    /// A receiver notified on every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardState>> {
        self.state.clone()
    }

    async fn send(&self, command: Command) -> Result<(), ControllerStopped> {
        self.commands.send(command).await.map_err(|_| ControllerStopped)
    }
}

/// The controller task is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("refresh controller has stopped")]
pub struct ControllerStopped;

/// Owns the configuration and snapshot and drives the fetch cycle.
pub struct RefreshController<S> {
    source: Arc<S>,
    period: Duration,
    state: DashboardState,
    publisher: watch::Sender<Arc<DashboardState>>,
    commands: mpsc::Receiver<Command>,
    fetches: JoinSet<FetchOutcome>,
    next_sequence: u64,
    applied_sequence: u64,
}

impl<S: EventSource> RefreshController<S> {
    /// Build a controller and the handle that drives it, without starting it.
    fn new(source: Arc<S>, config: FilterConfig, period: Duration) -> (Self, RefreshHandle) {
        let state = DashboardState::initial(config);
        let (publisher, state_rx) = watch::channel(Arc::new(state.clone()));
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        let controller = Self {
            source,
            period,
            state,
            publisher,
            commands: rx,
            fetches: JoinSet::new(),
            next_sequence: 0,
            applied_sequence: 0,
        };
        let handle = RefreshHandle {
            commands: tx,
            state: state_rx,
        };
        (controller, handle)
    }

    /// Start a controller task. The first fetch is issued immediately.
    pub fn spawn(source: Arc<S>, config: FilterConfig, period: Duration) -> (RefreshHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(source, config, period);
        (handle, tokio::spawn(controller.run()))
    }

    async fn run(mut self) {
        self.issue_fetch(Trigger::Startup);

        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::SetConfig(config)) => self.apply_config(config, &mut timer),
                    Some(Command::Refresh) => self.issue_fetch(Trigger::Manual),
                    Some(Command::Shutdown) | None => break,
                },
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok(outcome) => self.complete(outcome),
                        Err(e) => warn!("fetch task failed: {e}"),
                    }
                }
                _ = timer.tick() => self.issue_fetch(Trigger::Timer),
            }
        }

        self.fetches.abort_all();
        info!("refresh controller stopped");
    }

    fn apply_config(&mut self, config: FilterConfig, timer: &mut tokio::time::Interval) {
        self.state.generation += 1;
        self.state.config = config;
        debug!(generation = self.state.generation, "filter configuration changed");
        // The periodic cycle restarts from the config change.
        timer.reset();
        self.issue_fetch(Trigger::ConfigChange);
    }

    fn issue_fetch(&mut self, trigger: Trigger) {
        self.next_sequence += 1;
        let ticket = FetchTicket {
            generation: self.state.generation,
            sequence: self.next_sequence,
        };
        let query = build_query(&self.state.config, Utc::now());
        debug!(?trigger, ?ticket, params = query.params().len(), "issuing fetch");

        let source = Arc::clone(&self.source);
        self.fetches.spawn(async move {
            let result = source.fetch_events(&query).await;
            FetchOutcome { ticket, result }
        });

        self.state.status = RefreshStatus::Fetching;
        self.publish();
    }

    fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.generation == self.state.generation && ticket.sequence > self.applied_sequence
    }

    fn complete(&mut self, outcome: FetchOutcome) {
        let FetchOutcome { ticket, result } = outcome;
        if !self.is_current(ticket) {
            self.state.stale_discarded += 1;
            debug!(?ticket, current = self.state.generation, "discarding stale fetch result");
            self.publish();
            return;
        }
        self.applied_sequence = ticket.sequence;

        match result {
            Ok(events) => {
                self.state.snapshot = Snapshot::new(events);
                debug!(count = self.state.snapshot.len(), "snapshot replaced");
                self.state.status = RefreshStatus::Ready;
                self.state.last_error = None;
            }
            Err(e) => {
                warn!("feed fetch failed: {e}");
                self.state.snapshot = Snapshot::empty();
                self.state.status = RefreshStatus::Failed;
                self.state.last_error = Some(e.to_string());
            }
        }
        self.state.last_updated = Some(Utc::now());
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.state.clone()));
    }
}
