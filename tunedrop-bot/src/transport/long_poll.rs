//! Long-poll update delivery
//!
//! Repeatedly holds a getUpdates call open against the Bot API and fans the
//! returned updates out to per-update handling tasks. Transport errors back
//! off briefly and the loop continues; delivery only stops with the process.

use crate::orchestrator::Orchestrator;
use crate::transport::spawn_update_handling;
use crate::transport::telegram::TelegramApi;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub async fn run(api: Arc<TelegramApi>, orchestrator: Arc<Orchestrator>) {
    // A stale webhook registration makes getUpdates return 409s.
    if let Err(err) = api.delete_webhook().await {
        warn!(error = %err, "Could not clear webhook registration");
    }

    info!("Long-poll transport started");

    let mut offset = 0i64;

    loop {
        let updates = match api.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(error = %err, "getUpdates failed, backing off");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            spawn_update_handling(update, Arc::clone(&api), Arc::clone(&orchestrator));
        }
    }
}
