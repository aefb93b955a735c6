//! Per-auction distributed mutex.
//!
//! Serialization is required at per-auction granularity only: bids on
//! different auctions never contend. The mutex is built on a shared cache
//! service exposing set-if-absent with expiry and compare-and-delete —
//! replaceable by any technology offering those primitives.
//!
//! Expiry guarantees liveness if a holder crashes mid-operation; the
//! owner-token release means a process can never delete a lock it lost to
//! its own expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gavel_types::{AuctionId, Clock, GavelError, MutexConfig, Result};
use tracing::warn;

/// The coordination-service boundary: a shared key/value cache with
/// expiring entries.
pub trait SharedCache: Send + Sync {
    /// Store `value` under `key` only if the key is absent (or expired).
    /// Returns whether the write happened.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Current live value for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Delete `key` only if its live value equals `expected`. Returns
    /// whether a delete happened.
    fn delete_if_equals(&self, key: &str, expected: &str) -> bool;
}

/// In-process cache with clock-driven expiry. Stands in for the external
/// cache service in tests and single-node deployments.
pub struct InMemoryCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now + chrono::Duration::milliseconds(millis)
    }
}

impl SharedCache for InMemoryCache {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return false;
            }
            entries.remove(key);
        }
        entries.insert(key.to_string(), (value.to_string(), Self::expiry(now, ttl)));
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone())
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> bool {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now && value == expected => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// Holds the per-auction lock; released via compare-and-delete on drop.
pub struct AuctionGuard {
    cache: Arc<dyn SharedCache>,
    key: String,
    token: String,
}

impl std::fmt::Debug for AuctionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuctionGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Drop for AuctionGuard {
    fn drop(&mut self) {
        // If the lock expired and was re-acquired elsewhere, the token no
        // longer matches and nothing is deleted.
        let _ = self.cache.delete_if_equals(&self.key, &self.token);
    }
}

/// Per-auction mutual exclusion with bounded, short-interval retries.
pub struct AuctionMutex {
    cache: Arc<dyn SharedCache>,
    config: MutexConfig,
}

impl AuctionMutex {
    #[must_use]
    pub fn new(cache: Arc<dyn SharedCache>, config: MutexConfig) -> Self {
        Self { cache, config }
    }

    /// Acquire the lock for one auction.
    ///
    /// # Errors
    /// Returns `ServerBusy` once the configured attempts are exhausted;
    /// callers may retry, the mutex never retries beyond its budget.
    pub fn acquire(&self, auction_id: AuctionId) -> Result<AuctionGuard> {
        let key = format!("gavel:lock:{}", auction_id.0);
        let token = format!("{:032x}", rand::random::<u128>());
        for attempt in 0..self.config.max_attempts {
            if self.cache.set_if_absent(&key, &token, self.config.ttl) {
                return Ok(AuctionGuard {
                    cache: Arc::clone(&self.cache),
                    key,
                    token,
                });
            }
            if attempt + 1 < self.config.max_attempts && !self.config.retry_interval.is_zero() {
                std::thread::sleep(self.config.retry_interval);
            }
        }
        warn!(%auction_id, attempts = self.config.max_attempts, "auction mutex contended");
        Err(GavelError::ServerBusy { auction_id })
    }
}
