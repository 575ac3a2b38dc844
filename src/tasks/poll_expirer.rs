use crate::cache::TallyCache;
use crate::db::Database;
use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::interval;

const CHECK_INTERVAL_SECONDS: u64 = 60;

// Periodic sweep applying OPEN -> EXPIRED to polls past their expiration
// timestamp. The transition is a conditional update, so racing a concurrent
// consensus close is harmless.
pub async fn check_expired_polls_task(database: Arc<Database>, cache: Arc<dyn TallyCache>) {
    info!("Starting background task to expire overdue polls...");
    let mut interval = interval(StdDuration::from_secs(CHECK_INTERVAL_SECONDS));

    loop {
        interval.tick().await;
        let now = Utc::now();

        match database.get_expired_poll_ids(now).await {
            Ok(poll_ids) => {
                if poll_ids.is_empty() {
                    continue;
                }
                info!("Found {} overdue poll(s).", poll_ids.len());
                for poll_id in poll_ids {
                    match database.expire_poll(&poll_id).await {
                        Ok(true) => {
                            cache.invalidate(&poll_id).await;
                            info!("Expired poll {}", poll_id);
                        }
                        // Settled between the scan and the update; nothing to do.
                        Ok(false) => {}
                        Err(e) => error!("Failed to expire poll {}: {}", poll_id, e),
                    }
                }
            }
            Err(e) => {
                error!("Failed to query for overdue polls: {}", e);
            }
        }
    }
}
