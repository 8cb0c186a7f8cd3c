use std::sync::Arc;

use tokio::sync::watch;

use crate::monitor::ActivityMonitor;
use crate::retention::RetentionManager;

/// Periodic maintenance loop: failure-counter sweep plus one retention cycle
/// per interval. Retention failures are logged and retried next cycle; they
/// never take the process down.
pub fn spawn(
    retention: Arc<RetentionManager>,
    monitor: Arc<ActivityMonitor>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs, "retention scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(interval_secs)) => {}
                _ = shutdown.changed() => {
                    continue;
                }
            }

            // Counter windows self-reset lazily on the next failure; the
            // sweep just reclaims abandoned entries.
            monitor.sweep_counters();

            if let Err(e) = retention.run_cycle().await {
                tracing::error!("retention cycle failed: {e}");
            }
        }

        tracing::info!("retention scheduler stopped");
    })
}
