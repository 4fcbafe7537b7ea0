//! # TTL Store
//!
//! A concurrent key/value map whose entries carry an expiry timestamp.
//!
//! ```text
//!     TtlStore<V>
//!     ┌──────────────────────────────────────────┐
//!     │  DashMap<String, CacheEntry<V>>          │
//!     │  ┌──────────────┬──────────┬──────────┐  │
//!     │  │ key          │ value    │ expires  │  │
//!     │  ├──────────────┼──────────┼──────────┤  │
//!     │  │ rate:1.2.3.4 │ [t1, t2] │ t2+60s   │  │
//!     │  │ ban:5.6.7.8  │ BanInfo  │ t+5m     │  │
//!     │  └──────────────┴──────────┴──────────┘  │
//!     └──────────────────────────────────────────┘
//! ```
//!
//! Expiry is lazy: [`TtlStore::get`] treats an entry with `now > expires_at`
//! as absent and removes it on the way out. Nothing inside the store expires
//! entries proactively; the sweeper does that by walking [`TtlStore::keys`].

use super::clock::{Clock, SystemClock};
use dashmap::DashMap;
use std::time::Duration;

/// A stored value and the moment it stops being visible.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at_ms: u64,
}

/// Generic expiring key/value store.
///
/// Values are cloned out on read, so `V` should be cheap to clone or small.
///
/// # Example
///
/// ```rust
/// use rampart::{ManualClock, TtlStore};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let store = TtlStore::with_clock(clock.clone());
///
/// store.set("greeting", "hello".to_string(), Duration::from_secs(1));
/// assert_eq!(store.get("greeting").as_deref(), Some("hello"));
///
/// clock.advance_ms(1_001);
/// assert_eq!(store.get("greeting"), None);
/// ```
pub struct TtlStore<V, C = SystemClock>
where
    C: Clock,
{
    entries: DashMap<String, CacheEntry<V>, ahash::RandomState>,
    clock: C,
}

impl<V> TtlStore<V, SystemClock>
where
    V: Clone,
{
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<V> Default for TtlStore<V, SystemClock>
where
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> TtlStore<V, C>
where
    V: Clone,
    C: Clock,
{
    /// Creates an empty store reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self::with_capacity_and_clock(0, clock)
    }

    /// Creates an empty store pre-sized for `capacity` entries.
    pub fn with_capacity_and_clock(capacity: usize, clock: C) -> Self {
        // Same shard sizing as the rest of the engine: one shard per core,
        // rounded to a power of two, capped at 64.
        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .next_power_of_two()
            .clamp(2, 64);

        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                ahash::RandomState::new(),
                num_shards,
            ),
            clock,
        }
    }

    /// Stores `value` under `key`, replacing any previous entry. It stays
    /// visible for `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Returns a clone of the value under `key`, or `None` if it is absent
    /// or expired. Expired entries are removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.get(key) {
            if now <= entry.expires_at_ms {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // The read guard is released above; re-check under the write lock in
        // case the entry was refreshed in between.
        self.entries
            .remove_if(key, |_, entry| now > entry.expires_at_ms);
        None
    }

    /// Removes `key` only if its TTL has lapsed. Returns whether it did.
    pub fn remove_expired(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries
            .remove_if(key, |_, entry| now > entry.expires_at_ms)
            .is_some()
    }

    /// Removes `key`. Returns whether an entry (live or expired) was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot of all stored keys, including entries that have expired but
    /// have not been read since. Order is the map's native iteration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of stored entries, expired ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current time as seen by this store.
    #[inline]
    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

impl<V, C: Clock> std::fmt::Debug for TtlStore<V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
