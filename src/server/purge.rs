//! Periodic cleanup of expired sign-in state

use crate::auth::EmailLinkAuth;
use crate::storage::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sweep expired sessions, used link nonces and lapsed resend cooldowns
/// every `every` until `cancel` fires. The first sweep runs immediately.
pub async fn purge_loop(
    sessions: Arc<dyn SessionStore>,
    auth: Arc<EmailLinkAuth>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        auth.prune_cooldowns();
        match sessions.purge_expired(Utc::now()).await {
            Ok(0) => debug!("Nothing to purge"),
            Ok(removed) => info!(removed, "Purged expired sessions and links"),
            // Try again on the next tick
            Err(e) => warn!(error = %e, "Failed to purge expired sessions"),
        }
    }

    debug!("Purge loop stopped");
}
