//! In-memory response cache with TTL expiry and LRU eviction.
//!
//! Keys are a SHA-256 digest of the prompt plus every generation parameter
//! that affects the output. Entries expire lazily after a TTL and the least
//! recently used entry is evicted when the cache reaches capacity.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::models::GenerateResponse;

/// A generation parameter value that can be canonically serialized.
///
/// Closed set of types on purpose: a value without an unambiguous string
/// form is unrepresentable, so two different requests can never collapse
/// onto the same key through a lossy coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            // f64 Display is the shortest round-trip decimal, so equal
            // values always serialize identically (0.7 vs 0.70)
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Derive a deterministic cache key from a prompt and its generation
/// parameters.
///
/// Parameters are sorted by name before hashing so the key does not depend
/// on call-site ordering. The canonical form is `name=value` pairs joined
/// with `;`, separated from the prompt by an ASCII unit separator (0x1F).
pub fn derive_key(prompt: &str, params: &[(&str, ParamValue)]) -> String {
    let mut sorted: Vec<&(&str, ParamValue)> = params.iter().collect();
    sorted.sort_by_key(|pair| pair.0);

    let canonical = sorted
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(";");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update([0x1f]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rejected cache configuration. Invalid knobs fail at startup, never
/// silently clamped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    #[error("cache capacity must be at least 1 entry")]
    ZeroCapacity,
    #[error("cache TTL must be at least 1 second")]
    ZeroTtl,
}

// A cached response with its absolute expiry time. Replaced wholesale on
// re-insert, never mutated in place.
#[derive(Debug)]
struct CacheEntry {
    payload: GenerateResponse,
    expires_at: Instant,
}

// Map for direct lookup plus recency list for eviction order (LRU at the
// front, MRU at the back). Always mutated together under the lock.
#[derive(Debug)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// Snapshot of cache counters, served on the admin stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
}

/// Thread-safe bounded response cache.
///
/// All operations are synchronous and in-memory; the internal lock is only
/// held around map and recency-list bookkeeping, never across a backend
/// call. Expiry is lazy: expired entries are dropped when touched, there is
/// no background sweep.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Create a cache bounded to `capacity` entries with a default TTL.
    pub fn new(capacity: usize, default_ttl: Duration) -> Result<Self, CacheConfigError> {
        if capacity == 0 {
            return Err(CacheConfigError::ZeroCapacity);
        }
        if default_ttl.is_zero() {
            return Err(CacheConfigError::ZeroTtl);
        }
        Ok(Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                hits: 0,
                misses: 0,
            }),
            capacity,
            default_ttl,
        })
    }

    /// Look up a cached response. Returns `None` when the key is absent or
    /// expired; expired entries are removed on the spot. A hit moves the
    /// entry to most-recently-used and returns a clone of the payload.
    pub fn get(&self, key: &str) -> Option<GenerateResponse> {
        let now = Instant::now();
        let mut inner = self.locked();

        // Probe expiry with an immutable borrow first to avoid overlapping
        // borrows when removing.
        let expired = inner.entries.get(key).map(|e| now >= e.expires_at);
        match expired {
            None => {
                inner.misses += 1;
                debug!(key = %&key[..16.min(key.len())], "cache miss");
                None
            }
            Some(true) => {
                inner.entries.remove(key);
                Self::forget(&mut inner.order, key);
                inner.misses += 1;
                debug!(key = %&key[..16.min(key.len())], "cache entry expired, removing");
                None
            }
            Some(false) => {
                Self::forget(&mut inner.order, key);
                inner.order.push_back(key.to_string());
                inner.hits += 1;
                debug!(key = %&key[..16.min(key.len())], "cache hit");
                Some(inner.entries[key].payload.clone())
            }
        }
    }

    /// Store a response under `key` with the default TTL.
    pub fn insert(&self, key: String, payload: GenerateResponse) {
        self.insert_with_ttl(key, payload, self.default_ttl);
    }

    /// Store a response with an explicit TTL. Re-inserting an existing key
    /// replaces its value and expiry without counting against capacity;
    /// otherwise the least recently used entry is evicted when full. The
    /// inserted key becomes most-recently-used.
    pub fn insert_with_ttl(&self, key: String, payload: GenerateResponse, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut inner = self.locked();

        if inner.entries.contains_key(&key) {
            Self::forget(&mut inner.order, &key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(lru) = inner.order.pop_front() {
                inner.entries.remove(&lru);
                debug!(key = %&lru[..16.min(lru.len())], "evicting least recently used entry");
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, CacheEntry { payload, expires_at });
    }

    /// Remove all entries. Hit/miss counters are preserved: clearing is an
    /// admin invalidation of contents, not a reset of lookup history.
    pub fn clear(&self) {
        let mut inner = self.locked();
        inner.entries.clear();
        inner.order.clear();
        debug!("cache cleared");
    }

    /// Number of entries currently stored (expired-but-untouched included).
    pub fn len(&self) -> usize {
        self.locked().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot. `hit_rate` is 0 until the first lookup.
    pub fn stats(&self) -> CacheStats {
        let inner = self.locked();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            size: inner.entries.len(),
            capacity: self.capacity,
            ttl_seconds: self.default_ttl.as_secs(),
        }
    }

    fn locked(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().expect("cache lock poisoned")
    }

    // Drop `key` from the recency list if present.
    fn forget(order: &mut VecDeque<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn resp(text: &str) -> GenerateResponse {
        GenerateResponse {
            model: "test-model".into(),
            response: text.into(),
        }
    }

    fn cache(capacity: usize) -> ResponseCache {
        ResponseCache::new(capacity, Duration::from_secs(3600)).unwrap()
    }

    fn params() -> Vec<(&'static str, ParamValue)> {
        vec![
            ("max_length", ParamValue::Int(50)),
            ("num_return_sequences", ParamValue::Int(1)),
            ("temperature", ParamValue::Float(0.7)),
        ]
    }

    #[test]
    fn key_is_deterministic() {
        let k1 = derive_key("hello", &params());
        let k2 = derive_key("hello", &params());
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64, "expected a full sha256 hex digest");
    }

    #[test]
    fn key_ignores_param_ordering() {
        let forward = params();
        let mut reversed = params();
        reversed.reverse();
        assert_eq!(derive_key("hello", &forward), derive_key("hello", &reversed));
    }

    #[test]
    fn key_is_prompt_sensitive() {
        assert_ne!(derive_key("hello", &params()), derive_key("goodbye", &params()));
    }

    #[test]
    fn key_is_param_value_sensitive() {
        let base = params();
        let mut hotter = params();
        hotter[2] = ("temperature", ParamValue::Float(0.8));
        let mut longer = params();
        longer[0] = ("max_length", ParamValue::Int(51));

        assert_ne!(derive_key("hello", &base), derive_key("hello", &hotter));
        assert_ne!(derive_key("hello", &base), derive_key("hello", &longer));
    }

    #[test]
    fn key_canonicalizes_equal_floats() {
        // 0.70 parses to the same f64 as 0.7, so the keys must agree
        let a = [("temperature", ParamValue::Float(0.7))];
        let b = [("temperature", ParamValue::Float(0.70))];
        assert_eq!(derive_key("hello", &a), derive_key("hello", &b));
    }

    #[test]
    fn key_handles_empty_inputs() {
        let k1 = derive_key("", &[]);
        let k2 = derive_key("", &[]);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
        assert_ne!(k1, derive_key("x", &[]));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = ResponseCache::new(0, Duration::from_secs(3600)).unwrap_err();
        assert_eq!(err, CacheConfigError::ZeroCapacity);
    }

    #[test]
    fn rejects_zero_ttl() {
        let err = ResponseCache::new(100, Duration::ZERO).unwrap_err();
        assert_eq!(err, CacheConfigError::ZeroTtl);
    }

    #[test]
    fn hit_and_miss_accounting() {
        let cache = cache(10);
        assert_eq!(cache.stats().hit_rate, 0.0, "no lookups yet");

        assert!(cache.get("a").is_none());
        cache.insert("a".into(), resp("v1"));
        assert_eq!(cache.get("a"), Some(resp("v1")));
        assert!(cache.get("b").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = cache(5);
        for i in 0..10 {
            cache.insert(format!("k{i}"), resp("v"));
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn evicts_first_inserted_without_intervening_gets() {
        let cache = cache(3);
        for i in 0..4 {
            cache.insert(format!("k{i}"), resp("v"));
        }
        assert!(cache.get("k0").is_none(), "first-inserted key should be evicted");
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn touching_a_key_changes_the_eviction_victim() {
        let cache = cache(3);
        cache.insert("k0".into(), resp("v0"));
        cache.insert("k1".into(), resp("v1"));
        cache.insert("k2".into(), resp("v2"));
        // k0 becomes most-recently-used, so k1 is now the LRU
        assert!(cache.get("k0").is_some());
        cache.insert("k3".into(), resp("v3"));

        assert!(cache.get("k1").is_none(), "k1 was least recently used");
        assert!(cache.get("k0").is_some());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_removed() {
        let cache = cache(10);
        cache.insert_with_ttl("k".into(), resp("v"), Duration::ZERO);
        assert_eq!(cache.len(), 1);

        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0, "expired entry is dropped on lookup");
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn live_entry_is_served_before_expiry() {
        let cache = cache(10);
        cache.insert_with_ttl("k".into(), resp("v"), Duration::from_secs(3600));
        assert_eq!(cache.get("k"), Some(resp("v")));
    }

    #[test]
    fn reinserting_replaces_without_eviction() {
        let cache = cache(2);
        cache.insert("a".into(), resp("v1"));
        cache.insert("b".into(), resp("v2"));
        cache.insert("a".into(), resp("v1-updated"));

        assert_eq!(cache.len(), 2, "replace must not double-count capacity");
        assert_eq!(cache.get("a"), Some(resp("v1-updated")));
        assert_eq!(cache.get("b"), Some(resp("v2")));
    }

    #[test]
    fn read_through_scenario() {
        let cache = cache(2);
        cache.insert("a".into(), resp("1"));
        cache.insert("b".into(), resp("2"));

        assert_eq!(cache.get("a"), Some(resp("1")));
        assert_eq!(cache.len(), 2);

        // "a" was just touched, so "b" is the LRU and gets evicted
        cache.insert("c".into(), resp("3"));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c"), Some(resp("3")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_empties_entries_but_preserves_counters() {
        let cache = cache(10);
        cache.insert("a".into(), resp("v"));
        let _ = cache.get("a");
        let _ = cache.get("missing");

        cache.clear();

        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1, "clear keeps lookup history");
        assert_eq!(stats.misses, 1);
        assert!(cache.get("a").is_none(), "cleared entries are gone");
    }

    #[test]
    fn concurrent_inserts_respect_capacity() {
        let capacity = 8;
        let cache = Arc::new(ResponseCache::new(capacity, Duration::from_secs(3600)).unwrap());

        // 4 threads insert 2x capacity distinct keys in total
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..4 {
                        cache.insert(format!("t{t}-k{i}"), resp("v"));
                        assert!(cache.len() <= capacity);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), capacity);
    }

    #[test]
    fn concurrent_lookups_lose_no_counter_increments() {
        let cache = Arc::new(cache(16));
        cache.insert("shared".into(), resp("v"));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        // half hits on the shared key, half misses
                        if i % 2 == 0 {
                            assert!(cache.get("shared").is_some());
                        } else {
                            assert!(cache.get(&format!("absent-t{t}-{i}")).is_none());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.hits, 100);
        assert_eq!(stats.misses, 100);
        assert_eq!(stats.hits + stats.misses, 200, "every lookup is counted exactly once");
    }
}
