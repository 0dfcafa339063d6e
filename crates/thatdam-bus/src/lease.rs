//! Advisory leader leases keyed by ring.
//!
//! A lease is held by exactly one holder per ring until it is released,
//! expires, or (for AMQP) the holding connection drops. [`LeaseKeeper`]
//! renews a held lease in the background and reports loss on a watch
//! channel.
//!
//! # Tiger Style
//!
//! - Renewal interval is well under the lease TTL (5s vs 20s)
//! - Keeper tasks are cancellable and release the lease on the way out

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use lapin::options::QueueDeclareOptions;
use lapin::options::QueueDeleteOptions;
use lapin::types::AMQPValue;
use lapin::types::FieldTable;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use snafu::ResultExt;
use thatdam_constants::bus::LEASE_QUEUE_PREFIX;
use thatdam_constants::bus::LEASE_RENEW_INTERVAL_SECS;
use thatdam_constants::bus::LEASE_TTL_MS;
use thatdam_constants::supervisor::TASK_SHUTDOWN_GRACE_SECS;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::AmqpSnafu;
use crate::error::ConnectSnafu;
use crate::error::Result;

/// Exclusive, expiring ownership of a ring.
#[async_trait]
pub trait LeaderLease: Send + Sync {
    /// Try to take the lease. `Ok(false)` when another holder has it.
    async fn acquire(&self, ring: &str, holder: &str) -> Result<bool>;

    /// Extend a held lease. `Ok(false)` when it has been lost.
    async fn renew(&self, ring: &str, holder: &str) -> Result<bool>;

    /// Give the lease up. Releasing a lease not held is a no-op.
    async fn release(&self, ring: &str, holder: &str) -> Result<()>;
}

#[async_trait]
impl<T: LeaderLease + ?Sized> LeaderLease for Arc<T> {
    async fn acquire(&self, ring: &str, holder: &str) -> Result<bool> {
        (**self).acquire(ring, holder).await
    }

    async fn renew(&self, ring: &str, holder: &str) -> Result<bool> {
        (**self).renew(ring, holder).await
    }

    async fn release(&self, ring: &str, holder: &str) -> Result<()> {
        (**self).release(ring, holder).await
    }
}

fn lease_queue(ring: &str) -> String {
    format!("{LEASE_QUEUE_PREFIX}{ring}")
}

// ============================================================================
// In-process
// ============================================================================

/// Lease table in process memory, with TTL expiry.
#[derive(Debug)]
pub struct InProcLease {
    ttl: Duration,
    held: std::sync::Mutex<HashMap<String, (String, Instant)>>,
}

impl Default for InProcLease {
    fn default() -> Self {
        Self::new(Duration::from_millis(LEASE_TTL_MS))
    }
}

impl InProcLease {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Current unexpired holder of `ring`.
    pub fn holder(&self, ring: &str) -> Option<String> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get(ring).filter(|(_, expiry)| *expiry > Instant::now()).map(|(holder, _)| holder.clone())
    }
}

#[async_trait]
impl LeaderLease for InProcLease {
    async fn acquire(&self, ring: &str, holder: &str) -> Result<bool> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((current, expiry)) = held.get(ring) {
            if *expiry > now && current != holder {
                return Ok(false);
            }
        }
        held.insert(ring.to_string(), (holder.to_string(), now + self.ttl));
        Ok(true)
    }

    async fn renew(&self, ring: &str, holder: &str) -> Result<bool> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.get_mut(ring) {
            Some((current, expiry)) if current == holder && *expiry > now => {
                *expiry = now + self.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, ring: &str, holder: &str) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(ring).is_some_and(|(current, _)| current == holder) {
            held.remove(ring);
        }
        Ok(())
    }
}

// ============================================================================
// AMQP
// ============================================================================

struct LeaseLink {
    holder: String,
    conn: Connection,
    channel: Channel,
}

/// Broker-backed lease: holding the exclusive queue `lock.ring.<ring>`
/// is holding the lease.
///
/// Each held ring gets its own connection, so losing the connection
/// releases exactly that lease.
pub struct AmqpLease {
    url: String,
    links: Mutex<HashMap<String, LeaseLink>>,
}

impl AmqpLease {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            links: Mutex::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for AmqpLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpLease").finish_non_exhaustive()
    }
}

fn lease_args() -> FieldTable {
    let mut args = FieldTable::default();
    args.insert("x-expires".into(), AMQPValue::LongInt(LEASE_TTL_MS as i32));
    args
}

#[async_trait]
impl LeaderLease for AmqpLease {
    async fn acquire(&self, ring: &str, holder: &str) -> Result<bool> {
        let mut links = self.links.lock().await;
        if let Some(link) = links.get(ring) {
            if link.holder == holder && link.conn.status().connected() {
                return Ok(true);
            }
        }
        if let Some(stale) = links.remove(ring) {
            let _ = stale.conn.close(200, "lease reset").await;
        }

        let conn = Connection::connect(&self.url, ConnectionProperties::default()).await.context(ConnectSnafu)?;
        let channel = conn.create_channel().await.context(AmqpSnafu { op: "create channel" })?;
        let declared = channel
            .queue_declare(
                &lease_queue(ring),
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                lease_args(),
            )
            .await;
        match declared {
            Ok(_) => {
                info!(ring, holder, "leader lease acquired");
                links.insert(
                    ring.to_string(),
                    LeaseLink {
                        holder: holder.to_string(),
                        conn,
                        channel,
                    },
                );
                Ok(true)
            }
            Err(e) => {
                // Another connection owns the exclusive queue.
                debug!(ring, error = %e, "leader lease held elsewhere");
                let _ = conn.close(200, "lease busy").await;
                Ok(false)
            }
        }
    }

    async fn renew(&self, ring: &str, holder: &str) -> Result<bool> {
        let mut links = self.links.lock().await;
        let Some(link) = links.get(ring).filter(|l| l.holder == holder) else {
            return Ok(false);
        };
        let alive = link.conn.status().connected()
            && link
                .channel
                .queue_declare(
                    &lease_queue(ring),
                    QueueDeclareOptions {
                        passive: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .is_ok();
        if !alive {
            warn!(ring, holder, "leader lease lost");
            if let Some(lost) = links.remove(ring) {
                let _ = lost.conn.close(200, "lease lost").await;
            }
        }
        Ok(alive)
    }

    async fn release(&self, ring: &str, holder: &str) -> Result<()> {
        let mut links = self.links.lock().await;
        if !links.get(ring).is_some_and(|l| l.holder == holder) {
            return Ok(());
        }
        let Some(link) = links.remove(ring) else {
            return Ok(());
        };
        let deleted = link
            .channel
            .queue_delete(&lease_queue(ring), QueueDeleteOptions::default())
            .await
            .context(AmqpSnafu { op: "delete lease queue" });
        if let Err(e) = link.conn.close(200, "lease released").await {
            debug!(ring, error = %e, "lease connection close");
        }
        info!(ring, holder, "leader lease released");
        deleted.map(|_| ())
    }
}

// ============================================================================
// Keeper
// ============================================================================

/// Background renewal of a held lease.
pub struct LeaseKeeper {
    cancel: CancellationToken,
    held: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl LeaseKeeper {
    /// Renew `ring` for `holder` every few seconds until cancelled or lost.
    ///
    /// The lease must already be held. On cancellation the lease is released.
    pub fn spawn(lease: Arc<dyn LeaderLease>, ring: &str, holder: &str, parent: &CancellationToken) -> Self {
        Self::spawn_with_interval(lease, ring, holder, parent, Duration::from_secs(LEASE_RENEW_INTERVAL_SECS))
    }

    pub fn spawn_with_interval(
        lease: Arc<dyn LeaderLease>,
        ring: &str,
        holder: &str,
        parent: &CancellationToken,
        interval: Duration,
    ) -> Self {
        let cancel = parent.child_token();
        let (tx, held) = watch::channel(true);
        let ring = ring.to_string();
        let holder = holder.to_string();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        if let Err(e) = lease.release(&ring, &holder).await {
                            warn!(ring = %ring, error = %e, "lease release failed");
                        }
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
                let renewed = match lease.renew(&ring, &holder).await {
                    Ok(renewed) => renewed,
                    Err(e) => {
                        warn!(ring = %ring, error = %e, "lease renew failed");
                        false
                    }
                };
                if !renewed {
                    let _ = tx.send(false);
                    break;
                }
                debug!(ring = %ring, "lease renewed");
            }
        });
        Self {
            cancel,
            held,
            task: Some(task),
        }
    }

    pub fn is_held(&self) -> bool {
        *self.held.borrow()
    }

    /// Flips to `false` once the lease is lost.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.held.clone()
    }

    /// Stop renewing and release the lease.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let grace = Duration::from_secs(TASK_SHUTDOWN_GRACE_SECS);
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("lease keeper did not stop within grace period");
            }
        }
    }
}

impl Drop for LeaseKeeper {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inproc_lease_is_exclusive() {
        let lease = InProcLease::default();
        assert!(lease.acquire("default", "a").await.unwrap());
        assert!(!lease.acquire("default", "b").await.unwrap());
        assert!(lease.acquire("default", "a").await.unwrap());
        assert!(lease.acquire("other", "b").await.unwrap());
        assert_eq!(lease.holder("default").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_inproc_lease_expires() {
        let lease = InProcLease::new(Duration::from_millis(20));
        assert!(lease.acquire("r", "a").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!lease.renew("r", "a").await.unwrap());
        assert!(lease.acquire("r", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_noop() {
        let lease = InProcLease::default();
        lease.acquire("r", "a").await.unwrap();
        lease.release("r", "b").await.unwrap();
        assert_eq!(lease.holder("r").as_deref(), Some("a"));
        lease.release("r", "a").await.unwrap();
        assert!(lease.holder("r").is_none());
    }

    #[test]
    fn test_lease_queue_name() {
        assert_eq!(lease_queue("default"), "lock.ring.default");
    }
}
