//! Daemon loop
//!
//! Runs a reconciliation cycle immediately and then once per sync period
//! until shutdown is requested. Every cycle runs in its own task, so neither
//! an error nor a panic inside a cycle can end the loop; the next cycle is
//! the retry.

use crate::error::KeymasterError;
use crate::reconcile::{Reconciler, SyncReport};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Why a cycle produced no report
#[derive(Error, Debug)]
pub enum CycleError {
    /// The cycle stopped before reconciling any interface
    #[error("sync aborted: {0}")]
    Aborted(#[from] KeymasterError),

    /// The cycle panicked
    #[error("sync panicked: {0}")]
    Panicked(String),
}

/// Periodic reconciliation driver
pub struct Daemon {
    reconciler: Arc<Reconciler>,
    sync_period: Duration,
}

impl Daemon {
    /// Create a daemon running `reconciler` every `sync_period`
    pub fn new(reconciler: Arc<Reconciler>, sync_period: Duration) -> Self {
        Self {
            reconciler,
            sync_period,
        }
    }

    /// Time between the starts of two cycles
    pub fn sync_period(&self) -> Duration {
        self.sync_period
    }

    /// Run a single cycle in its own task
    pub async fn run_cycle(&self) -> Result<SyncReport, CycleError> {
        let reconciler = Arc::clone(&self.reconciler);
        match tokio::spawn(async move { reconciler.sync().await }).await {
            Ok(result) => Ok(result?),
            Err(join_error) if join_error.is_panic() => {
                Err(CycleError::Panicked(panic_message(join_error.into_panic())))
            }
            Err(join_error) => Err(CycleError::Panicked(join_error.to_string())),
        }
    }

    /// Run cycles until `shutdown` completes.
    ///
    /// Shutdown is honored between cycles; a running cycle is allowed to
    /// finish. Returns the number of cycles run.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.sync_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycles, "shutdown requested, stopping sync loop");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    debug!(cycle = cycles, "starting sync cycle");
                    log_outcome(cycles, self.run_cycle().await);
                    debug!(period = ?self.sync_period, "waiting until next sync");
                }
            }
        }
        cycles
    }
}

fn log_outcome(cycle: u64, outcome: Result<SyncReport, CycleError>) {
    match outcome {
        Ok(report) if report.is_success() => {
            debug!(cycle, %report, "sync cycle succeeded");
        }
        Ok(report) => {
            for failure in &report.failures {
                warn!(
                    cycle,
                    interface = %failure.interface,
                    operation = %failure.operation,
                    error = %failure.error,
                    "interface not reconciled"
                );
            }
        }
        Err(e) => error!(cycle, error = %e, "sync cycle failed"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
