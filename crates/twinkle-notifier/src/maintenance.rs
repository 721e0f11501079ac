//! Periodic retention purge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use twinkle_store::{Database, PurgeReport, StoreError};

/// Delete messages older than `retention_days` and repair the counters of
/// every conversation that lost messages.
pub async fn run_once(
    db: &Mutex<Database>,
    retention_days: i64,
) -> Result<PurgeReport, StoreError> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let db = db.lock().await;
    db.purge_messages_before(cutoff)
}

/// Run [`run_once`] every `interval`, starting immediately.
pub fn spawn(db: Arc<Mutex<Database>>, retention_days: i64, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match run_once(&db, retention_days).await {
                Ok(report) => tracing::info!(
                    deleted = report.deleted_messages,
                    counters = report.recomputed_counters,
                    cutoff = %report.cutoff,
                    "maintenance run complete"
                ),
                Err(e) => tracing::error!(error = %e, "maintenance run failed"),
            }
        }
    })
}
