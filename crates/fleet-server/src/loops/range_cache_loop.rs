//! Periodic range cache pruning and flush.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::cache::RangeCache;

const RANGE_CACHE_PRUNE_SECS: u64 = 60;

pub async fn run_range_cache_loop(cache: Arc<RangeCache>, shutdown: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(RANGE_CACHE_PRUNE_SECS));
    // The first tick fires immediately; the cache was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let before = cache.len();
                cache.prune();
                let pruned = before.saturating_sub(cache.len());
                if pruned == 0 {
                    continue;
                }
                tracing::debug!(pruned, remaining = cache.len(), "pruned range cache");
                if let Err(err) = cache.persist().await {
                    tracing::warn!(error = %err, "range cache flush failed");
                }
            }
        }
    }

    if let Err(err) = cache.persist().await {
        tracing::warn!(error = %err, "range cache final flush failed");
    }
    tracing::info!("range cache loop shutting down");
}
