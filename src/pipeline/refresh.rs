// file: src/pipeline/refresh.rs
// description: periodic reload of the in-memory index from the record store
// reference: tokio interval task with watch-channel shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::index::EmbeddingIndex;

/// Picks up rows written to the shared store by other processes.
pub struct IndexRefresher {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IndexRefresher {
    /// Starts refreshing every `interval`. The first refresh happens one
    /// interval after spawning.
    pub fn spawn(index: Arc<EmbeddingIndex>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match index.refresh_from_store().await {
                            Ok(report) if report.upserted + report.removed > 0 => {
                                info!(
                                    upserted = report.upserted,
                                    removed = report.removed,
                                    "Index refreshed from store"
                                );
                            }
                            Ok(_) => debug!("Index already current"),
                            Err(e) => warn!(error = %e, "Index refresh failed"),
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Refresh task ended abnormally");
        }
    }
}
