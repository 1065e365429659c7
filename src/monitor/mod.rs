//! The monitor: a supervised poll loop over a [`MailSource`].
//!
//! One loop owns the source connection. Each cycle fetches new items, runs
//! every item through the enricher and then the notifier (isolating
//! failures per item), and sleeps for the poll interval. A failed fetch
//! triggers at most one reconnect and the cycle counts as empty. Only a
//! failed initial connection ends the run with an error.
//!
//! Cancellation is cooperative: [`Monitor::stop`] trips a
//! [`CancellationToken`] that the loop checks before each fetch, before each
//! item, and before each sleep. Sleeps race the token, so shutdown never
//! waits out a full poll interval. An item whose enrich/deliver is already
//! in flight is allowed to finish.

pub mod state;

pub use state::MonitorState;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::enrich::Enricher;
use crate::error::{ItemError, MonitorError, SourceError};
use crate::notify::Notifier;
use crate::pipeline::types::{CycleReport, Item, RunReport};
use crate::source::MailSource;

/// Collaborators injected into a [`Monitor`].
pub struct MonitorDeps {
    pub source: Box<dyn MailSource>,
    pub enricher: Arc<dyn Enricher>,
    pub notifier: Arc<dyn Notifier>,
}

/// Result of a call to [`Monitor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The loop ran until stopped.
    Completed(RunReport),
    /// `start` had already been called; nothing was done.
    AlreadyStarted(MonitorState),
}

/// Supervised mailbox poll loop.
pub struct Monitor {
    config: MonitorConfig,
    source: Mutex<Box<dyn MailSource>>,
    enricher: Arc<dyn Enricher>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    started: AtomicBool,
    state: watch::Sender<MonitorState>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, deps: MonitorDeps) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        Self {
            config,
            source: Mutex::new(deps.source),
            enricher: deps.enricher,
            notifier: deps.notifier,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Run the monitor until it is stopped.
    ///
    /// Returns `Err` only when the initial connection fails. A second call
    /// (while running or after the run ended) logs a warning and returns
    /// [`RunOutcome::AlreadyStarted`].
    pub async fn start(&self) -> Result<RunOutcome, MonitorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            let state = self.state();
            warn!(%state, "Monitor already started; ignoring start()");
            return Ok(RunOutcome::AlreadyStarted(state));
        }

        let mut guard = self.source.lock().await;
        let source: &mut dyn MailSource = &mut **guard;

        if self.cancel.is_cancelled() {
            info!("Stop requested before start; not connecting");
            self.transition(MonitorState::Stopping);
            self.shutdown(source).await;
            return Ok(RunOutcome::Completed(RunReport::default()));
        }

        self.transition(MonitorState::Connecting);
        info!(source = source.name(), "Connecting to mailbox");
        if let Err(e) = guarded_connect(source).await {
            warn!(source = source.name(), error = %e, "Initial connection failed");
            self.disconnect_quietly(source).await;
            self.transition(MonitorState::Stopped);
            return Err(MonitorError::StartupConnection(e));
        }
        self.transition(MonitorState::Polling);
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            pacing_ms = self.config.pacing_delay.as_millis() as u64,
            notifier = self.notifier.name(),
            "Monitor started"
        );

        let mut report = RunReport::default();
        let mut cycle: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            cycle += 1;
            let cycle_report = self.run_cycle(source, cycle).await;
            report.absorb(&cycle_report);

            if self.cancel.is_cancelled() {
                break;
            }
            debug!(cycle, secs = self.config.poll_interval.as_secs(), "Sleeping until next cycle");
            if !self.pause(self.config.poll_interval).await {
                break;
            }
        }

        self.transition(MonitorState::Stopping);
        self.shutdown(source).await;
        info!(
            cycles = report.cycles,
            delivered = report.delivered,
            failed = report.failed,
            abandoned = report.abandoned,
            "Monitor stopped"
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Request shutdown. Non-blocking, idempotent, and safe before `start`.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            debug!("Stop already requested");
            return;
        }
        info!(state = %self.state(), "Stop requested");
        self.cancel.cancel();
        self.transition(MonitorState::Stopping);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// One fetch → process → report pass.
    async fn run_cycle(&self, source: &mut dyn MailSource, cycle: u64) -> CycleReport {
        let mut report = CycleReport::new(cycle);

        let items = match guarded_fetch(source).await {
            Ok(items) => items,
            Err(e) => {
                warn!(cycle, source = source.name(), error = %e, "Fetch failed; cycle skipped");
                report.fetch_failed = true;
                if self.config.reconnect_on_fetch_failure {
                    report.reconnected = Some(self.reconnect(source, cycle).await);
                }
                return report;
            }
        };

        report.fetched = items.len();
        if items.is_empty() {
            debug!(cycle, "No new items");
            return report;
        }
        info!(cycle, count = items.len(), "Processing new items");

        let total = items.len();
        for (index, item) in items.into_iter().enumerate() {
            if self.cancel.is_cancelled()
                || (index > 0 && !self.pause(self.config.pacing_delay).await)
            {
                report.abandoned = total - index;
                info!(cycle, abandoned = report.abandoned, "Stop requested; leaving rest of batch");
                break;
            }

            let id = item.id.clone();
            match self.process_item(item).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(cycle, item = %id, error = %e, "Item processing failed");
                }
            }
        }

        info!(
            cycle,
            delivered = report.delivered,
            failed = report.failed,
            "Cycle complete"
        );
        report
    }

    /// Enrich then deliver one item.
    async fn process_item(&self, item: Item) -> Result<(), ItemError> {
        let id = item.id.clone();

        let enriched = AssertUnwindSafe(self.enricher.enrich(item))
            .catch_unwind()
            .await
            .map_err(|p| ItemError::EnrichPanicked {
                id: id.clone(),
                reason: panic_message(p),
            })?;

        let accepted = AssertUnwindSafe(self.notifier.deliver(&enriched))
            .catch_unwind()
            .await
            .map_err(|p| ItemError::DeliveryPanicked {
                id: id.clone(),
                reason: panic_message(p),
            })?;

        if !accepted {
            return Err(ItemError::DeliveryRejected {
                id,
                channel: self.notifier.name().to_string(),
            });
        }
        debug!(item = %id, subject = %enriched.subject, "Item delivered");
        Ok(())
    }

    /// Disconnect, then try exactly one connect. Returns whether it worked.
    async fn reconnect(&self, source: &mut dyn MailSource, cycle: u64) -> bool {
        self.transition(MonitorState::Connecting);
        self.disconnect_quietly(source).await;

        let ok = match guarded_connect(source).await {
            Ok(()) => {
                info!(cycle, source = source.name(), "Reconnected");
                true
            }
            Err(e) => {
                warn!(cycle, source = source.name(), error = %e, "Reconnect failed; retrying next cycle");
                false
            }
        };
        self.transition(MonitorState::Polling);
        ok
    }

    /// Stopping → Stopped, always disconnecting once.
    async fn shutdown(&self, source: &mut dyn MailSource) {
        self.disconnect_quietly(source).await;
        self.transition(MonitorState::Stopped);
    }

    async fn disconnect_quietly(&self, source: &mut dyn MailSource) {
        match AssertUnwindSafe(source.disconnect()).catch_unwind().await {
            Ok(Ok(())) => debug!(source = source.name(), "Disconnected"),
            Ok(Err(e)) => warn!(source = source.name(), error = %e, "Disconnect failed"),
            Err(p) => warn!(source = source.name(), reason = %panic_message(p), "Disconnect panicked"),
        }
    }

    /// Sleep for `duration` unless stopped first. `false` means stopped.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Apply a state change if the machine allows it. Same-state and
    /// disallowed changes (e.g. a reconnect racing a stop) are ignored.
    fn transition(&self, to: MonitorState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|current| {
            if *current == to || !current.can_transition_to(to) {
                return false;
            }
            from = Some(*current);
            *current = to;
            true
        });
        match from {
            Some(from) => debug!(%from, %to, "Monitor state changed"),
            None if self.state() != to => {
                debug!(current = %self.state(), requested = %to, "State change ignored")
            }
            None => {}
        }
        changed
    }
}

async fn guarded_connect(source: &mut dyn MailSource) -> Result<(), SourceError> {
    AssertUnwindSafe(source.connect())
        .catch_unwind()
        .await
        .unwrap_or_else(|p| Err(SourceError::Panicked(panic_message(p))))
}

async fn guarded_fetch(source: &mut dyn MailSource) -> Result<Vec<Item>, SourceError> {
    AssertUnwindSafe(source.fetch_new())
        .catch_unwind()
        .await
        .unwrap_or_else(|p| Err(SourceError::Panicked(panic_message(p))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
