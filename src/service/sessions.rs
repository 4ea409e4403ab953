use crate::db::Storage;
use std::time::Duration;
use tracing::{debug, warn};

/// Periodically delete expired session rows.
pub fn spawn_session_sweeper(storage: Storage, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match storage.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => debug!(purged = n, "expired sessions removed"),
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    })
}
