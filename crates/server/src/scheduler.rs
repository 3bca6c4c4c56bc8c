//! Periodic trigger for catalogue update cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use catalogue_core::{CycleOutcome, UpdateCoordinator};

/// Start running update cycles every `interval`, the first one immediately.
pub fn spawn(coordinator: Arc<UpdateCoordinator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // A cycle slower than the interval delays the next one instead of
        // bunching up catch-up ticks.
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            let cycle = Arc::clone(&coordinator);
            if let Err(e) = tokio::spawn(async move { run_once(&cycle).await }).await {
                tracing::error!(error = %e, "catalogue update cycle panicked; retrying on the next tick");
            }
        }
    })
}

/// Run a single cycle, logging rather than propagating failures.
pub async fn run_once(coordinator: &UpdateCoordinator) -> Option<CycleOutcome> {
    match coordinator.run_cycle().await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "catalogue update cycle finished");
            Some(outcome)
        }
        Err(e) => {
            tracing::error!(error = %e, "catalogue update failed; serving the previous copy");
            None
        }
    }
}
