//! Advisory leader lease table behind `POST /v1/leader/claim`.
//!
//! One holder at a time; the lease lapses when the holder stops
//! re-claiming within the TTL. The epoch increments on every change of
//! holder so nodes can detect a takeover.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use thatdam_constants::bus::LEASE_TTL_MS;
use tracing::info;

/// Outcome of a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderGrant {
    pub granted: bool,
    pub epoch: u64,
    /// Current holder after the claim.
    pub holder: Option<String>,
}

#[derive(Debug, Default)]
struct Lease {
    holder: Option<String>,
    expires: Option<Instant>,
    epoch: u64,
}

#[derive(Debug)]
pub struct LeaderTable {
    ttl: Duration,
    lease: Mutex<Lease>,
}

impl Default for LeaderTable {
    fn default() -> Self {
        Self::new(Duration::from_millis(LEASE_TTL_MS))
    }
}

impl LeaderTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            lease: Mutex::new(Lease::default()),
        }
    }

    /// Grant the lease to `node_id` if it is free, expired or already theirs.
    pub fn claim(&self, node_id: &str) -> LeaderGrant {
        self.claim_at(node_id, Instant::now())
    }

    fn claim_at(&self, node_id: &str, now: Instant) -> LeaderGrant {
        let mut lease = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        let live = lease.expires.is_some_and(|at| at > now);
        let held_by_other = live && lease.holder.as_deref().is_some_and(|h| h != node_id);
        if held_by_other {
            return LeaderGrant {
                granted: false,
                epoch: lease.epoch,
                holder: lease.holder.clone(),
            };
        }
        if lease.holder.as_deref() != Some(node_id) {
            lease.epoch += 1;
            lease.holder = Some(node_id.to_string());
            info!(holder = node_id, epoch = lease.epoch, "leader lease granted");
        }
        lease.expires = Some(now + self.ttl);
        LeaderGrant {
            granted: true,
            epoch: lease.epoch,
            holder: lease.holder.clone(),
        }
    }

    /// Live holder, if any.
    pub fn holder(&self) -> Option<String> {
        let lease = self.lease.lock().unwrap_or_else(PoisonError::into_inner);
        let live = lease.expires.is_some_and(|at| at > Instant::now());
        if live {
            lease.holder.clone()
        } else {
            None
        }
    }

    pub fn epoch(&self) -> u64 {
        self.lease.lock().unwrap_or_else(PoisonError::into_inner).epoch
    }
}
