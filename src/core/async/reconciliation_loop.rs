//! Background reconciliation loop
//!
//! This module provides the `ReconciliationLoop`, which runs
//! [`CirculationEngine::process_all_overdue`] on a fixed interval so fines
//! keep accruing and borrowing statuses stay current without any request
//! touching them.
//!
//! # Design
//!
//! ```text
//!            start(config)                 stop()
//! Stopped ─────────────────► Running ─────────────────► Stopped
//!                              │ tick (immediately, then every interval)
//!                              ▼
//!                     pass on the blocking pool
//! ```
//!
//! - The first tick fires immediately, so `start` runs a pass right away.
//! - The task awaits each pass before taking the next tick and missed ticks
//!   are skipped, so scheduled passes never overlap.
//! - A manual [`ReconciliationLoop::run_once`] while a pass is in flight is
//!   skipped rather than queued. The in-flight guard lives with the pass on
//!   the blocking pool, so dropping a `run_once` future does not release it.
//! - `stop` cancels the schedule and waits for an in-flight pass to finish.
//!
//! # Thread Safety
//!
//! The loop is cloneable; clones share the same schedule and status. Passes
//! run on tokio's blocking pool because the store API is synchronous.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::engine::CirculationEngine;
use crate::core::fine_calculator::{FineOutcome, ReconcileResult};
use crate::core::traits::{LedgerStore, StoreResult};
use crate::types::CirculationError;

/// Configuration for the reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Time between the starts of two scheduled passes
    pub interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl LoopConfig {
    /// Create a new LoopConfig, falling back to the default on a zero interval
    pub fn new(interval_ms: u64) -> Self {
        let default = Self::default();

        let interval = if interval_ms == 0 {
            warn!(
                interval_ms,
                default_ms = default.interval.as_millis() as u64,
                "Invalid reconciliation interval, using default"
            );
            default.interval
        } else {
            Duration::from_millis(interval_ms)
        };

        Self { interval }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Running,
}

/// Tally of one completed pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub candidates: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Set when the candidate listing itself failed
    pub error: Option<String>,
}

impl PassSummary {
    fn from_results(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: &[ReconcileResult],
    ) -> Self {
        let mut summary = Self {
            started_at,
            finished_at,
            candidates: results.len(),
            created: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            error: None,
        };
        for result in results {
            match &result.outcome {
                Ok(FineOutcome::Created { .. }) => summary.created += 1,
                Ok(FineOutcome::Updated { .. }) => summary.updated += 1,
                Ok(FineOutcome::Unchanged { .. }) | Ok(FineOutcome::NotOverdue) => {
                    summary.unchanged += 1
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    fn failed_pass(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: &CirculationError,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            candidates: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Observable state of the loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub interval_ms: u64,
    /// Wall-clock time the last pass completed
    pub last_run_at: Option<DateTime<Utc>>,
    pub passes: u64,
    pub last_pass: Option<PassSummary>,
}

#[derive(Debug, Default)]
struct Schedule {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

#[derive(Debug, Default)]
struct Shared {
    schedule: Mutex<Schedule>,
    in_flight: Mutex<bool>,
    history: Mutex<History>,
}

impl Shared {
    fn record(&self, summary: &PassSummary) {
        let mut history = self.history.lock();
        history.last_run_at = Some(summary.finished_at);
        history.passes += 1;
        history.last_pass = Some(summary.clone());
    }
}

#[derive(Debug, Default)]
struct History {
    last_run_at: Option<DateTime<Utc>>,
    passes: u64,
    last_pass: Option<PassSummary>,
}

/// Clears the in-flight flag when the pass ends, even on panic
struct InFlight(Arc<Shared>);

impl InFlight {
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        let mut busy = shared.in_flight.lock();
        if *busy {
            return None;
        }
        *busy = true;
        Some(Self(Arc::clone(shared)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        *self.0.in_flight.lock() = false;
    }
}

/// Run one pass on the calling thread and summarize it
fn run_pass<S: LedgerStore>(engine: &CirculationEngine<S>) -> PassSummary {
    let started_at = engine.now();
    let outcome = engine.process_all_overdue();
    let finished_at = engine.now();

    match outcome {
        Ok(results) => {
            let summary = PassSummary::from_results(started_at, finished_at, &results);
            if summary.candidates > 0 {
                info!(
                    candidates = summary.candidates,
                    created = summary.created,
                    updated = summary.updated,
                    failed = summary.failed,
                    "Reconciliation pass complete"
                );
            } else {
                debug!("Reconciliation pass found nothing overdue");
            }
            summary
        }
        Err(e) => {
            error!(error = %e, "Reconciliation pass failed");
            PassSummary::failed_pass(started_at, finished_at, &e)
        }
    }
}

/// Periodic fine and status reconciliation
pub struct ReconciliationLoop<S> {
    engine: CirculationEngine<S>,
    shared: Arc<Shared>,
}

impl<S> Clone for ReconciliationLoop<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: LedgerStore + 'static> ReconciliationLoop<S> {
    pub fn new(engine: CirculationEngine<S>) -> Self {
        Self {
            engine,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Start the schedule on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns a Conflict error if the loop is already running.
    pub fn start(&self, config: LoopConfig) -> StoreResult<()> {
        let mut schedule = self.shared.schedule.lock();
        if schedule.cancel.is_some() {
            return Err(CirculationError::conflict(
                "Reconciliation loop is already running",
            ));
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let this = self.clone();
        let interval = config.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        this.run_once().await;
                    }
                }
            }
            info!("Reconciliation loop stopped");
        });

        schedule.cancel = Some(token);
        schedule.task = Some(task);
        schedule.interval = interval;
        info!(
            interval_ms = interval.as_millis() as u64,
            "Reconciliation loop started"
        );
        Ok(())
    }

    /// Stop the schedule, waiting for an in-flight pass to finish
    ///
    /// Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let (cancel, task) = {
            let mut schedule = self.shared.schedule.lock();
            (schedule.cancel.take(), schedule.task.take())
        };
        let Some(cancel) = cancel else {
            return false;
        };

        cancel.cancel();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Reconciliation task ended abnormally");
            }
        }
        true
    }

    /// Run one pass now
    ///
    /// Returns `None` without doing anything when a pass is already in flight.
    pub async fn run_once(&self) -> Option<PassSummary> {
        let Some(guard) = InFlight::acquire(&self.shared) else {
            debug!("Reconciliation pass already in flight, skipping");
            return None;
        };

        let started_at = self.engine.now();
        let engine = self.engine.clone();
        // The pass records itself and releases the guard when it finishes,
        // whether or not this future is still being polled
        let outcome = tokio::task::spawn_blocking(move || {
            let summary = run_pass(&engine);
            guard.0.record(&summary);
            drop(guard);
            summary
        })
        .await;

        match outcome {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "Reconciliation pass panicked");
                let summary = PassSummary::failed_pass(
                    started_at,
                    self.engine.now(),
                    &CirculationError::store(e.to_string()),
                );
                self.shared.record(&summary);
                Some(summary)
            }
        }
    }

    pub fn status(&self) -> LoopStatus {
        let (state, interval) = {
            let schedule = self.shared.schedule.lock();
            let state = if schedule.cancel.is_some() {
                LoopState::Running
            } else {
                LoopState::Stopped
            };
            (state, schedule.interval)
        };
        let history = self.shared.history.lock();
        LoopStatus {
            state,
            interval_ms: interval.as_millis() as u64,
            last_run_at: history.last_run_at,
            passes: history.passes,
            last_pass: history.last_pass.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.schedule.lock().cancel.is_some()
    }
}
