//! Discards playback sessions whose player went away without closing them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

const PLAYBACK_PRUNE_SECS: u64 = 60;

pub async fn run_playback_prune_loop(state: Arc<AppState>, shutdown: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(PLAYBACK_PRUNE_SECS));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("playback prune loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let pruned = state.prune_playback(Utc::now());
                if pruned > 0 {
                    tracing::debug!(pruned, remaining = state.playback_count(), "pruned idle playback sessions");
                }
            }
        }
    }
}
