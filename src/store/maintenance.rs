use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::InMemoryStore;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<InMemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if compact_if_due(&store, threshold).await {
            info!("compacted WAL");
        }
    }
}

/// Returns whether a compaction ran and succeeded.
pub(crate) async fn compact_if_due(store: &InMemoryStore, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => true,
        Err(e) => {
            warn!("compaction after {appends} appends failed: {e}");
            false
        }
    }
}
