use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use rand::RngCore;
use serde::Serialize;
use thatdam_constants::claims::CLAIM_RANDOM_BYTES;
use thatdam_constants::claims::CLAIM_TTL_SECS;
use thatdam_constants::claims::MAX_PENDING_CLAIMS;
use tokio::sync::watch;

use crate::error::ClaimError;
use crate::error::CapacityExceededSnafu;

/// Identifier and secret handed to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub id: String,
    pub token: String,
}

struct ClaimEntry {
    token: String,
    fulfilled: bool,
    created_at: Instant,
    /// Rendezvous for watchers; created once per claim and never reused.
    signal: watch::Sender<bool>,
}

/// Handle that resolves once when its claim is fulfilled.
#[derive(Debug)]
pub struct ClaimWatch {
    rx: watch::Receiver<bool>,
}

impl ClaimWatch {
    /// Wait for fulfilment.
    ///
    /// Returns `true` when the claim was fulfilled and `false` if it expired
    /// or was evicted first. Resolves immediately for an already fulfilled
    /// claim.
    pub async fn fulfilled(mut self) -> bool {
        self.rx.wait_for(|done| *done).await.is_ok()
    }

    /// Non-blocking check.
    pub fn is_fulfilled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Concurrent store of pending and fulfilled claims.
///
/// All operations take a single lock and never block on I/O.
pub struct ClaimStore {
    claims: Mutex<HashMap<String, ClaimEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for ClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimStore {
    pub fn new() -> Self {
        Self::with_limits(Duration::from_secs(CLAIM_TTL_SECS), MAX_PENDING_CLAIMS)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            claims: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClaimEntry>> {
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a claim with random opaque id and token.
    pub fn create(&self) -> Result<Claim, ClaimError> {
        let mut claims = self.lock();
        if claims.len() >= self.capacity {
            return CapacityExceededSnafu {
                count: claims.len(),
                max: self.capacity,
            }
            .fail();
        }

        let mut id = random_hex();
        while claims.contains_key(&id) {
            id = random_hex();
        }
        let token = random_hex();
        let (signal, _) = watch::channel(false);
        claims.insert(id.clone(), ClaimEntry {
            token: token.clone(),
            fulfilled: false,
            created_at: Instant::now(),
            signal,
        });
        tracing::debug!(claim_id = %id, "claim created");
        Ok(Claim { id, token })
    }

    /// Fulfil a claim.
    ///
    /// Returns `false` if the id is unknown, the token does not match, or the
    /// claim was already fulfilled. Otherwise marks it fulfilled and signals
    /// every live watcher before returning.
    pub fn fulfill(&self, id: &str, token: &str) -> bool {
        let mut claims = self.lock();
        let Some(entry) = claims.get_mut(id) else {
            return false;
        };
        if entry.fulfilled || !constant_time_eq(entry.token.as_bytes(), token.as_bytes()) {
            return false;
        }
        entry.fulfilled = true;
        entry.signal.send_replace(true);
        tracing::info!(claim_id = %id, "claim fulfilled");
        true
    }

    /// Watch a claim for fulfilment; `None` if the id is unknown.
    pub fn watch(&self, id: &str) -> Option<ClaimWatch> {
        let claims = self.lock();
        claims.get(id).map(|entry| ClaimWatch {
            rx: entry.signal.subscribe(),
        })
    }

    /// Whether the claim exists and has been fulfilled.
    pub fn is_fulfilled(&self, id: &str) -> bool {
        self.lock().get(id).is_some_and(|e| e.fulfilled)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop claims older than the TTL, and fulfilled claims nobody is
    /// watching any more.
    ///
    /// Watchers of an evicted unfulfilled claim resolve to `false`.
    /// Returns the number of evicted claims.
    pub fn evict_expired(&self) -> usize {
        self.evict_older_than(Instant::now(), self.ttl)
    }

    fn evict_older_than(&self, now: Instant, ttl: Duration) -> usize {
        let mut claims = self.lock();
        let before = claims.len();
        claims.retain(|_, entry| {
            let expired = now.saturating_duration_since(entry.created_at) > ttl;
            let settled = entry.fulfilled && entry.signal.receiver_count() == 0;
            !expired && !settled
        });
        before - claims.len()
    }
}

fn random_hex() -> String {
    let mut bytes = [0u8; CLAIM_RANDOM_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_create_returns_distinct_hex_pairs() {
        let store = ClaimStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.token, b.token);
        assert_eq!(a.id.len(), CLAIM_RANDOM_BYTES * 2);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fulfill_rejects_unknown_and_mismatched() {
        let store = ClaimStore::new();
        let claim = store.create().unwrap();
        assert!(!store.fulfill("nope", &claim.token));
        assert!(!store.fulfill(&claim.id, "wrong"));
        assert!(!store.is_fulfilled(&claim.id));
    }

    #[test]
    fn test_fulfill_is_single_use() {
        let store = ClaimStore::new();
        let claim = store.create().unwrap();
        assert!(store.fulfill(&claim.id, &claim.token));
        assert!(!store.fulfill(&claim.id, &claim.token));
    }

    #[tokio::test]
    async fn test_watch_after_fulfil_is_presignalled() {
        let store = ClaimStore::new();
        let claim = store.create().unwrap();
        store.fulfill(&claim.id, &claim.token);
        let watch = store.watch(&claim.id).unwrap();
        assert!(watch.is_fulfilled());
        assert!(watch.fulfilled().await);
    }

    #[tokio::test]
    async fn test_fulfil_signals_every_waiter() {
        let store = Arc::new(ClaimStore::new());
        let claim = store.create().unwrap();

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let watch = store.watch(&claim.id).unwrap();
            waiters.push(tokio::spawn(watch.fulfilled()));
        }
        tokio::task::yield_now().await;
        assert!(store.fulfill(&claim.id, &claim.token));

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[test]
    fn test_watch_unknown_is_none() {
        assert!(ClaimStore::new().watch("missing").is_none());
    }

    #[test]
    fn test_capacity_bound() {
        let store = ClaimStore::with_limits(Duration::from_secs(60), 2);
        store.create().unwrap();
        store.create().unwrap();
        let err = store.create().unwrap_err();
        assert!(matches!(err, ClaimError::CapacityExceeded { count: 2, max: 2 }));
    }

    #[tokio::test]
    async fn test_eviction_releases_waiters_unfulfilled() {
        let store = ClaimStore::with_limits(Duration::from_secs(60), 10);
        let claim = store.create().unwrap();
        let watch = store.watch(&claim.id).unwrap();

        let evicted = store.evict_older_than(Instant::now() + Duration::from_secs(120), Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert!(!watch.fulfilled().await);
        assert!(!store.fulfill(&claim.id, &claim.token));
    }

    #[test]
    fn test_unwatched_fulfilled_claims_free_capacity() {
        let store = ClaimStore::with_limits(Duration::from_secs(600), 2);
        let first = store.create().unwrap();
        let second = store.create().unwrap();
        assert!(store.create().is_err());

        let watches = [store.watch(&first.id).unwrap(), store.watch(&second.id).unwrap()];
        assert!(store.fulfill(&first.id, &first.token));
        assert!(store.fulfill(&second.id, &second.token));
        drop(watches);

        assert_eq!(store.evict_expired(), 2);
        assert!(store.is_empty());
        store.create().unwrap();
    }

    #[test]
    fn test_watched_fulfilled_claim_is_kept() {
        let store = ClaimStore::with_limits(Duration::from_secs(600), 2);
        let claim = store.create().unwrap();
        let watch = store.watch(&claim.id).unwrap();
        assert!(store.fulfill(&claim.id, &claim.token));

        assert_eq!(store.evict_expired(), 0);
        assert!(store.is_fulfilled(&claim.id));

        drop(watch);
        assert_eq!(store.evict_expired(), 1);
    }

    #[test]
    fn test_fresh_claims_survive_eviction() {
        let store = ClaimStore::new();
        store.create().unwrap();
        assert_eq!(store.evict_expired(), 0);
        assert_eq!(store.len(), 1);
    }
}
