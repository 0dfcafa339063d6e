//! Background stale marking.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::AgentRegistry;

/// Runs [`AgentRegistry::mark_stale`] once per TTL.
///
/// Tiger Style: Period equals the TTL, explicit shutdown, aborts on drop.
pub struct StaleSweeper {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StaleSweeper {
    pub fn spawn(registry: Arc<AgentRegistry>, cancel: &CancellationToken) -> Self {
        let cancel = cancel.child_token();
        let task_cancel = cancel.clone();
        let period = registry.ttl();
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        tracing::debug!("stale sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stale = registry.mark_stale();
                        if !stale.is_empty() {
                            tracing::info!(count = stale.len(), agents = ?stale, "agents marked stale");
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

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("stale sweeper task panicked: {}", e);
            }
        }
    }
}

impl Drop for StaleSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
