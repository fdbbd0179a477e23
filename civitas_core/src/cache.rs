//! Response cache with TTL expiry and bounded size.
//!
//! # Expiry
//!
//! Expiry is lazy: `get` treats an entry older than the TTL as absent but
//! leaves it in place. Expired entries keep occupying capacity until they
//! are overwritten or evicted.
//!
//! # Eviction
//!
//! When full, `put` evicts the oldest-*inserted* key. This is a FIFO
//! approximation of LRU: a frequently read entry is still evicted first if
//! it was inserted first. Reads do not reorder anything.
//!
//! # Failure
//!
//! The cache never reports errors. A refused write (value too large) or a
//! poisoned lock degrades to a miss.

use crate::config::CacheConfig;
use crate::orchestrator::InferenceMetrics;
use civitas_env::SessionContext;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Deterministic key over normalized prompt text, model id and tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `message` asked on `model_id`.
    ///
    /// Tier and model id are both part of the digest, so the same question
    /// on two tiers never collides, even when both tiers run one model.
    pub fn derive(message: &str, model_id: &str, is_boosted: bool) -> Self {
        let tier: &[u8] = if is_boosted { b"reasoning" } else { b"fast" };
        let mut hasher = Sha256::new();
        hasher.update(tier);
        hasher.update([0u8]);
        hasher.update(model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize_prompt(message).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 12 chars for readability
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Case-folds, trims and collapses whitespace runs.
pub fn normalize_prompt(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A cached model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text: String,

    /// Metrics of the generation that produced this entry
    pub metrics: InferenceMetrics,

    pub cost_estimate: f64,

    /// Session time at insertion
    pub created_at: Duration,
}

impl CacheEntry {
    /// Returns true once `now - created_at >= ttl`.
    pub fn is_expired(&self, now: Duration, ttl: Duration) -> bool {
        now.saturating_sub(self.created_at) >= ttl
    }
}

/// Counters for cache telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejected_writes: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,

    /// Insertion order, oldest first
    order: VecDeque<CacheKey>,

    stats: CacheStats,
    disposed: bool,
}

/// Session-owned response cache.
///
/// Lifecycle: `new` → any number of `get`/`put`/`clear` → `dispose`.
/// A disposed cache always misses and ignores writes.
pub struct ResponseCache<Ctx: SessionContext> {
    context: Arc<Ctx>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl<Ctx: SessionContext> ResponseCache<Ctx> {
    /// Creates an empty cache. `max_entries` is raised to at least 1.
    pub fn new(context: Arc<Ctx>, mut config: CacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        Self {
            context,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Creates an Arc-wrapped cache for sharing with an orchestrator.
    pub fn shared(context: Arc<Ctx>, config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(context, config))
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("response cache lock poisoned, treating as miss");
                None
            }
        }
    }

    /// Looks up a live entry.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.context.now();
        let mut state = self.lock()?;
        if state.disposed {
            return None;
        }

        let live = state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now, self.config.ttl()))
            .cloned();

        match live {
            Some(entry) => {
                state.stats.hits += 1;
                Some(entry)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Stores an entry, evicting the oldest-inserted key if full.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        let Some(mut state) = self.lock() else {
            return;
        };
        if state.disposed {
            return;
        }

        if entry.text.len() > self.config.max_value_bytes {
            state.stats.rejected_writes += 1;
            warn!(
                key = %key,
                bytes = entry.text.len(),
                limit = self.config.max_value_bytes,
                "response too large to cache"
            );
            return;
        }

        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        if state.entries.len() >= self.config.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                state.stats.evictions += 1;
                debug!(evicted = %oldest, "cache full, evicted oldest entry");
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, entry);
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            state.order.clear();
        }
    }

    /// Clears the cache and turns it into a permanent miss.
    pub fn dispose(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            state.order.clear();
            state.disposed = true;
        }
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().map_or_else(CacheStats::default, |state| state.stats)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use proptest::prelude::*;

    fn entry(text: &str, created_at: Duration) -> CacheEntry {
        CacheEntry {
            text: text.to_string(),
            metrics: InferenceMetrics::measured(100.0, false),
            cost_estimate: 0.01,
            created_at,
        }
    }

    fn cache(max_entries: usize, ttl_secs: u64) -> (Arc<ManualClock>, ResponseCache<ManualClock>) {
        let clock = ManualClock::shared(1);
        let config = CacheConfig {
            ttl_secs,
            max_entries,
            ..Default::default()
        };
        (clock.clone(), ResponseCache::new(clock, config))
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            CacheKey::derive("hello", "fast", false),
            CacheKey::derive("HELLO  ", "fast", false)
        );
        assert_eq!(
            CacheKey::derive("  What is   the Nexus? ", "fast", false),
            CacheKey::derive("what is the nexus?", "fast", false)
        );
        assert_eq!(normalize_prompt("  A\tB\n c "), "a b c");
    }

    #[test]
    fn test_key_partitions_by_tier() {
        assert_ne!(
            CacheKey::derive("hello", "fast", false),
            CacheKey::derive("hello", "reasoning", true)
        );
    }

    #[test]
    fn test_key_partitions_by_tier_with_shared_model() {
        assert_ne!(
            CacheKey::derive("hello", "shared", false),
            CacheKey::derive("hello", "shared", true)
        );
    }

    #[test]
    fn test_get_put_roundtrip() {
        let (_, cache) = cache(4, 60);
        let key = CacheKey::derive("status", "fast", false);
        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), entry("all green", Duration::ZERO));
        assert_eq!(cache.get(&key).unwrap().text, "all green");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_ttl_is_lazy() {
        let (clock, cache) = cache(4, 10);
        let key = CacheKey::derive("status", "fast", false);
        cache.put(key.clone(), entry("all green", Duration::ZERO));

        clock.advance(Duration::from_millis(9_999));
        assert!(cache.get(&key).is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get(&key).is_none());

        // Expired but still occupying capacity
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_two_evicts_first_inserted() {
        let (_, cache) = cache(2, 60);
        let a = CacheKey::derive("a", "fast", false);
        let b = CacheKey::derive("b", "fast", false);
        let c = CacheKey::derive("c", "fast", false);

        cache.put(a.clone(), entry("A", Duration::ZERO));
        cache.put(b.clone(), entry("B", Duration::ZERO));
        // Reading A does not protect it: eviction is by insertion order
        assert!(cache.get(&a).is_some());
        cache.put(c.clone(), entry("C", Duration::ZERO));

        assert!(cache.get(&a).is_none());
        assert_eq!(cache.get(&b).unwrap().text, "B");
        assert_eq!(cache.get(&c).unwrap().text, "C");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_keeps_insertion_position() {
        let (_, cache) = cache(2, 60);
        let a = CacheKey::derive("a", "fast", false);
        let b = CacheKey::derive("b", "fast", false);
        let c = CacheKey::derive("c", "fast", false);

        cache.put(a.clone(), entry("A1", Duration::ZERO));
        cache.put(b.clone(), entry("B", Duration::ZERO));
        cache.put(a.clone(), entry("A2", Duration::ZERO));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);

        cache.put(c.clone(), entry("C", Duration::ZERO));
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn test_oversized_value_degrades_to_miss() {
        let clock = ManualClock::shared(1);
        let cache = ResponseCache::new(
            clock,
            CacheConfig {
                max_value_bytes: 8,
                ..Default::default()
            },
        );
        let key = CacheKey::derive("essay", "fast", false);
        cache.put(key.clone(), entry("far too long for the cache", Duration::ZERO));

        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().rejected_writes, 1);
    }

    #[test]
    fn test_clear_and_dispose() {
        let (_, cache) = cache(4, 60);
        let key = CacheKey::derive("x", "fast", false);
        cache.put(key.clone(), entry("X", Duration::ZERO));
        cache.clear();
        assert!(cache.is_empty());

        cache.put(key.clone(), entry("X", Duration::ZERO));
        assert!(cache.get(&key).is_some());

        cache.dispose();
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), entry("X", Duration::ZERO));
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..8, keys in proptest::collection::vec(0u8..20, 0..60)) {
            let (_, cache) = cache(capacity, 60);
            let mut inserted = std::collections::HashSet::new();
            for k in keys {
                let key = CacheKey::derive(&k.to_string(), "fast", false);
                let before = cache.len();
                let evictions_before = cache.stats().evictions;
                let is_new = !inserted.contains(&k) || cache.get(&key).is_none();
                cache.put(key, entry("v", Duration::ZERO));
                inserted.insert(k);
                prop_assert!(cache.len() <= capacity);
                let evicted = cache.stats().evictions - evictions_before;
                prop_assert!(evicted <= 1);
                if is_new && before == capacity {
                    prop_assert_eq!(evicted, 1);
                }
            }
        }
    }
}
