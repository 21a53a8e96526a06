//! Short-TTL in-flight request deduplication.
//!
//! Logically equivalent submissions within a short window must collapse to
//! one. Keys hash into N shards, each behind its own mutex; expired entries
//! are reaped lazily on bucket access. A first-time submission is never
//! refused; accepting a true duplicate after the TTL is acceptable.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{ExecError, Result};

/// Minimum TTL (ms); shorter configs are clamped up.
const MIN_TTL_MS: u64 = 500;
/// Maximum TTL (ms); longer configs are clamped down.
const MAX_TTL_MS: u64 = 10_000;
/// TTL when none is configured.
pub const DEFAULT_TTL_MS: u64 = 2_000;
/// Shard count when none is configured.
pub const DEFAULT_SHARDS: usize = 16;

/// Sharded TTL gate over in-flight request keys.
pub struct InFlightGate {
    shards: Vec<Mutex<HashMap<String, u64>>>,
    ttl_ms: u64,
}

impl InFlightGate {
    /// Create a gate with the given TTL and shard count. The TTL is clamped
    /// to 500ms..=10s; at least one shard always exists.
    #[must_use]
    pub fn new(ttl: Duration, shards: usize) -> Self {
        let ttl_ms = (ttl.as_millis() as u64).clamp(MIN_TTL_MS, MAX_TTL_MS);
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            ttl_ms,
        }
    }

    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Install `key` unless a non-expired entry exists.
    ///
    /// An empty key always succeeds: requests without identity are not
    /// deduplicated.
    pub fn try_acquire(&self, key: &str) -> Result<()> {
        self.try_acquire_at(key, now_ms())
    }

    /// Deterministic variant taking the caller's clock.
    pub fn try_acquire_at(&self, key: &str, now_ms: u64) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let mut bucket = self.shard_for(key).lock();
        // Lazy expiry, this bucket only.
        bucket.retain(|_, expires_at| *expires_at > now_ms);
        if bucket.contains_key(key) {
            trace!(key, "duplicate in flight");
            return Err(ExecError::DuplicateInFlight(key.to_string()));
        }
        bucket.insert(key.to_string(), now_ms + self.ttl_ms);
        Ok(())
    }

    /// Best-effort early release; unknown and empty keys are no-ops.
    pub fn release(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.shard_for(key).lock().remove(key);
    }

    fn shard_for(&self, key: &str) -> &Mutex<HashMap<String, u64>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}

impl Default for InFlightGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TTL_MS), DEFAULT_SHARDS)
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_acquire_always_succeeds() {
        let gate = InFlightGate::default();
        for i in 0..1_000 {
            assert!(gate.try_acquire_at(&format!("key-{i}"), 0).is_ok());
        }
    }

    #[test]
    fn test_duplicate_within_ttl_refused() {
        let gate = InFlightGate::default();
        assert!(gate.try_acquire_at("k", 0).is_ok());
        assert!(matches!(
            gate.try_acquire_at("k", 100),
            Err(ExecError::DuplicateInFlight(_))
        ));
        // Still inside the 2s default TTL.
        assert!(gate.try_acquire_at("k", 1_999).is_err());
    }

    #[test]
    fn test_expires_after_ttl() {
        let gate = InFlightGate::default();
        assert!(gate.try_acquire_at("k", 0).is_ok());
        // 2.1s later the default 2s TTL has lapsed.
        assert!(gate.try_acquire_at("k", 2_100).is_ok());
    }

    #[test]
    fn test_release_allows_reacquire_regardless_of_ttl() {
        let gate = InFlightGate::default();
        assert!(gate.try_acquire_at("k", 0).is_ok());
        gate.release("k");
        assert!(gate.try_acquire_at("k", 1).is_ok());
    }

    #[test]
    fn test_empty_key_is_not_gated() {
        let gate = InFlightGate::default();
        assert!(gate.try_acquire_at("", 0).is_ok());
        assert!(gate.try_acquire_at("", 0).is_ok());
        gate.release("");
    }

    #[test]
    fn test_ttl_clamping() {
        assert_eq!(
            InFlightGate::new(Duration::from_millis(100), 4).ttl_ms(),
            500
        );
        assert_eq!(InFlightGate::new(Duration::from_secs(60), 4).ttl_ms(), 10_000);
        assert_eq!(InFlightGate::new(Duration::from_secs(2), 0).ttl_ms(), 2_000);
    }

    #[test]
    fn test_lazy_expiry_reaps_bucket() {
        let gate = InFlightGate::new(Duration::from_secs(1), 1);
        for i in 0..10 {
            assert!(gate.try_acquire_at(&format!("k{i}"), 0).is_ok());
        }
        // All expired; a later acquire on the same bucket reaps them.
        assert!(gate.try_acquire_at("fresh", 5_000).is_ok());
        assert_eq!(gate.shards[0].lock().len(), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_collide() {
        let gate = InFlightGate::default();
        assert!(gate.try_acquire_at("a", 0).is_ok());
        assert!(gate.try_acquire_at("b", 0).is_ok());
    }
}
