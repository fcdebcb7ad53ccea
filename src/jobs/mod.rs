//! Background work: the report generation queue and its workers, plus the
//! periodic retention and reconciliation pass.

mod queue;
mod worker;

pub use queue::{GenerationJob, GenerationQueue, QueueError};
pub use worker::GenerationWorker;

use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::services::ReportService;

/// Expires reports past retention and fails generations abandoned for longer
/// than `stale_after`, every `every`.
pub async fn run_maintenance(
    reports: ReportService,
    every: Duration,
    stale_after: chrono::Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Maintenance loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                if let Err(e) = reports.sweep_expired(now).await {
                    tracing::error!(error = %e, "Retention sweep failed");
                }
                if let Err(e) = reports.reconcile_stale(now, stale_after).await {
                    tracing::error!(error = %e, "Stale generation reconciliation failed");
                }
            }
        }
    }
}
