use crate::db::Database;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

const SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Daily sweep deleting event rows older than the retention horizon.
pub async fn start_retention_task(db: Database, retention_days: u64) {
    info!(
        "Starting retention sweeper: horizon {} days",
        retention_days
    );
    let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        match db
            .run_blocking(move |db| db.purge_older_than(retention_days))
            .await
        {
            Ok(0) => {}
            Ok(n) => info!("Retention sweep removed {} expired rows", n),
            Err(e) => warn!("Retention sweep failed: {}", e),
        }
    }
}
