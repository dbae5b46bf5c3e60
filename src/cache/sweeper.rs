//! Background eviction of expired cache entries
//!
//! The sweep runs on a fixed interval for as long as its `EvictionTask`
//! handle is alive. Dropping the handle stops the task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::CacheStore;

/// Default interval between sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Owned handle for the recurring sweep task
#[derive(Debug)]
pub struct EvictionTask {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl EvictionTask {
    /// Spawns the sweep loop on the current tokio runtime
    ///
    /// # Arguments
    /// * `store` - The cache to sweep
    /// * `interval` - Time between sweeps; the first sweep happens one interval after spawn
    pub fn spawn(store: Arc<CacheStore>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired();
                        debug!(removed, remaining = store.len(), "Swept expired cache entries");
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Signals the sweep loop to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for EvictionTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
