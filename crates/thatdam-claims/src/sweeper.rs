//! Background eviction of expired claims.

use std::sync::Arc;
use std::time::Duration;

use thatdam_constants::claims::CLAIM_SWEEP_INTERVAL_SECS;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::ClaimStore;

/// Periodically evicts expired claims and fulfilled claims with no watchers.
///
/// Tiger Style: Fixed sweep interval, explicit shutdown, aborts on drop.
pub struct ClaimSweeper {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ClaimSweeper {
    pub fn spawn(store: Arc<ClaimStore>, cancel: CancellationToken) -> Self {
        Self::spawn_with_interval(store, cancel, Duration::from_secs(CLAIM_SWEEP_INTERVAL_SECS))
    }

    pub fn spawn_with_interval(store: Arc<ClaimStore>, cancel: CancellationToken, period: Duration) -> Self {
        let cancel = cancel.child_token();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        tracing::debug!("claim sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = store.evict_expired();
                        if evicted > 0 {
                            tracing::info!(evicted, "evicted expired claims");
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop the sweep and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("claim sweeper task panicked: {}", e);
            }
        }
    }
}

impl Drop for ClaimSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
