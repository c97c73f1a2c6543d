use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use reloop_api::state::AppState;

/// Background task that drops blacklist entries whose token has expired.
/// An expired token is rejected on expiry alone, so its entry is dead weight.
pub async fn run_purge_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        let purged = tokio::task::spawn_blocking(move || db_state.db.purge_expired_blacklist(Utc::now())).await;

        match purged {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: purged {} expired blacklist entries", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
