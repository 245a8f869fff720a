use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::DurableStore;

/// Background task that compacts the WAL once `threshold` appends accumulate.
pub async fn run_compactor(store: Arc<DurableStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if compact_if_due(&store, threshold).await {
            info!("compacted WAL");
        }
    }
}

/// One compaction check. Returns true if the log was rewritten.
pub async fn compact_if_due(store: &DurableStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!("compaction not due: {appends}/{threshold} appends");
        return false;
    }
    match store.compact().await {
        Ok(()) => true,
        Err(e) => {
            warn!("WAL compaction failed after {appends} appends: {e}");
            false
        }
    }
}
