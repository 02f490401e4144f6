//! Caching layers for resolved keys, policies, and revocation lists
//!
//! Two layers: a size-bounded in-process L1 with frequency-aware
//! admission, and the shared KV as L2. Reads fall through L1 to L2; an
//! L2 hit repopulates L1 with a short TTL. Writes go through to both
//! layers with identical TTL.
//!
//! The keyspace is partitioned by prefix, see [`keys`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::error::Result;
use super::kv::KvStore;
use crate::domain::PublicKey32;
use crate::infra::GatewayError;

/// Cache key prefixes partitioning the shared keyspace
pub mod keys {
    /// Resolved DID public keys (32 raw bytes)
    pub const DID: &str = "did:";
    /// Revocation lists (JSON)
    pub const REVOCATION: &str = "rev:";
    /// Policy table snapshot (JSON)
    pub const POLICY: &str = "policy:";
    /// Outstanding challenge nonces
    pub const NONCE: &str = "nonce:";
    /// Rate limit counters
    pub const RATE: &str = "rate:";
}

/// Ceiling for L1 entries repopulated from an L2 hit; the remaining L2
/// lifetime is unknown at that point, so L1 stays deliberately short-lived.
const L1_REPOPULATE_TTL: Duration = Duration::from_secs(3600);

/// Frequency counters tracked per cache slot (10x capacity, the ratio
/// the original cache sizing recommends)
const COUNTERS_PER_ENTRY: usize = 10;

/// Counts saturate here; the whole table halves once enough touches
/// accumulate, so stale popularity decays
const MAX_FREQUENCY: u8 = 15;

// ============================================================================
// L1: in-process cache with frequency-aware admission
// ============================================================================

/// Access-frequency estimator behind the admission policy.
///
/// Keys are tracked by hash in a bounded table; every table-span of
/// touches halves all counts, so an entry that was hot an hour ago does
/// not stay privileged forever.
struct FrequencyCounters {
    counts: HashMap<u64, u8>,
    max_keys: usize,
    touches: u64,
}

impl FrequencyCounters {
    fn new(max_keys: usize) -> Self {
        Self {
            counts: HashMap::new(),
            max_keys,
            touches: 0,
        }
    }

    fn touch(&mut self, key_hash: u64) {
        let count = self.counts.entry(key_hash).or_insert(0);
        *count = count.saturating_add(1).min(MAX_FREQUENCY);

        self.touches += 1;
        if self.touches >= self.max_keys as u64 || self.counts.len() > self.max_keys {
            self.age();
        }
    }

    fn estimate(&self, key_hash: u64) -> u8 {
        self.counts.get(&key_hash).copied().unwrap_or(0)
    }

    fn age(&mut self) {
        self.touches = 0;
        self.counts.retain(|_, count| {
            *count /= 2;
            *count > 0
        });
    }
}

fn hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

struct CacheEntry<V> {
    value: V,
    key_hash: u64,
    expires_at: Instant,
    last_accessed: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    frequency: FrequencyCounters,
}

/// Cache counters
#[derive(Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rejections: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Inserts turned away by the admission policy
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Size-bounded in-memory cache with per-entry TTL and frequency-aware
/// admission.
///
/// At capacity a candidate only displaces the coldest resident entry
/// (estimated frequency, oldest access on ties) when it is at least as
/// hot; a burst of one-shot keys cannot flush the working set. Rejected
/// inserts are reported by `insert` returning false and counted in the
/// stats.
pub struct AdmissionCache<K, V> {
    max_entries: usize,
    inner: RwLock<Inner<K, V>>,
    stats: CacheStats,
}

impl<K, V> AdmissionCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                frequency: FrequencyCounters::new(max_entries * COUNTERS_PER_ENTRY),
            }),
            stats: CacheStats::default(),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.frequency.touch(hash_key(key));

        if let Some(entry) = inner.entries.get_mut(key) {
            if Instant::now() >= entry.expires_at {
                inner.entries.remove(key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_accessed = Instant::now();
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert `key`, subject to admission at capacity. Returns whether
    /// the entry was admitted; a false return leaves the resident set
    /// untouched (callers fall through to L2).
    pub async fn insert(&self, key: K, value: V, ttl: Duration) -> bool {
        let key_hash = hash_key(&key);
        let mut inner = self.inner.write().await;
        inner.frequency.touch(key_hash);

        let resident = inner.entries.contains_key(&key);
        if !resident && inner.entries.len() >= self.max_entries {
            let candidate_freq = inner.frequency.estimate(key_hash);
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (inner.frequency.estimate(e.key_hash), e.last_accessed))
                .map(|(k, e)| (k.clone(), inner.frequency.estimate(e.key_hash)));

            match victim {
                Some((_, victim_freq)) if candidate_freq < victim_freq => {
                    self.stats.rejections.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                Some((victim_key, _)) => {
                    inner.entries.remove(&victim_key);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
        }

        let now = Instant::now();
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                key_hash,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        true
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().await.entries.remove(key).map(|e| e.value)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// ============================================================================
// L1 + L2 multi-layer cache
// ============================================================================

/// Write-through two-layer cache over the shared KV.
pub struct MultiLayerCache {
    l1: AdmissionCache<String, Vec<u8>>,
    l2: Arc<dyn KvStore>,
}

impl MultiLayerCache {
    pub fn new(max_l1_entries: usize, l2: Arc<dyn KvStore>) -> Self {
        Self {
            l1: AdmissionCache::new(max_l1_entries),
            l2,
        }
    }

    /// Read through L1 then L2; an L2 hit repopulates L1 (subject to
    /// admission).
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.l1.get(&key.to_string()).await {
            return Ok(Some(value));
        }

        match self.l2.get(key).await? {
            Some(value) => {
                self.l1
                    .insert(key.to_string(), value.clone(), L1_REPOPULATE_TTL)
                    .await;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write through to both layers with the same TTL. L1 may decline a
    /// cold key; L2 is authoritative either way.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.l1.insert(key.to_string(), value.to_vec(), ttl).await;
        self.l2.set_with_ttl(key, value, ttl).await
    }

    /// Remove from both layers.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.l1.remove(&key.to_string()).await;
        self.l2.del(key).await
    }

    /// Read, loading and caching on miss.
    ///
    /// Concurrent misses for the same key each invoke the loader; callers
    /// on this path are read-only resolvers that tolerate redundant loads.
    pub async fn get_or_load<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = loader().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            tracing::warn!(key, error = %e, "cache write-through failed");
        }
        Ok(value)
    }

    pub fn l1_stats(&self) -> &CacheStats {
        self.l1.stats()
    }
}

// ============================================================================
// DID key cache
// ============================================================================

/// Cache of resolved DID public keys under the `did:` prefix.
///
/// Values are the 32 raw key bytes; encoding to multibase or base64url
/// happens at the boundaries, never in the cache.
pub struct DidKeyCache {
    cache: MultiLayerCache,
}

impl DidKeyCache {
    pub fn new(max_l1_entries: usize, l2: Arc<dyn KvStore>) -> Self {
        Self {
            cache: MultiLayerCache::new(max_l1_entries, l2),
        }
    }

    pub async fn get(&self, did: &str) -> Result<Option<PublicKey32>> {
        let key = format!("{}{}", keys::DID, did);
        match self.cache.get(&key).await? {
            Some(raw) => {
                let key: PublicKey32 = raw.try_into().map_err(|_| {
                    GatewayError::Internal(format!("cached key for {did} has invalid size"))
                })?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, did: &str, public_key: &PublicKey32, ttl: Duration) -> Result<()> {
        let key = format!("{}{}", keys::DID, did);
        self.cache.set(&key, public_key, ttl).await
    }

    pub async fn invalidate(&self, did: &str) -> Result<()> {
        let key = format!("{}{}", keys::DID, did);
        self.cache.delete(&key).await
    }

    pub fn stats(&self) -> &CacheStats {
        self.cache.l1_stats()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::kv::MemoryKv;

    fn layered() -> MultiLayerCache {
        MultiLayerCache::new(16, Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_admission_cache_basic() {
        let cache: AdmissionCache<String, i32> = AdmissionCache::new(10);

        assert!(cache.insert("a".into(), 1, Duration::from_secs(60)).await);
        assert!(cache.insert("b".into(), 2, Duration::from_secs(60)).await);

        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"c".to_string()).await, None);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[tokio::test]
    async fn test_eviction_prefers_cold_entries() {
        let cache: AdmissionCache<i32, i32> = AdmissionCache::new(3);

        cache.insert(1, 10, Duration::from_secs(60)).await;
        cache.insert(2, 20, Duration::from_secs(60)).await;
        cache.insert(3, 30, Duration::from_secs(60)).await;

        // Heat up 1 and 3; 2 stays cold at its insert-time frequency
        for _ in 0..4 {
            cache.get(&1).await;
            cache.get(&3).await;
        }

        // Make the candidate hotter than the cold resident, then insert
        cache.get(&4).await;
        cache.get(&4).await;
        assert!(cache.insert(4, 40, Duration::from_secs(60)).await);

        assert_eq!(cache.get(&1).await, Some(10));
        assert_eq!(cache.get(&2).await, None); // coldest, evicted
        assert_eq!(cache.get(&3).await, Some(30));
        assert_eq!(cache.get(&4).await, Some(40));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[tokio::test]
    async fn test_cold_candidate_rejected_at_capacity() {
        let cache: AdmissionCache<i32, i32> = AdmissionCache::new(3);

        cache.insert(1, 10, Duration::from_secs(60)).await;
        cache.insert(2, 20, Duration::from_secs(60)).await;
        cache.insert(3, 30, Duration::from_secs(60)).await;
        // Every resident has been seen twice now
        cache.get(&1).await;
        cache.get(&2).await;
        cache.get(&3).await;

        // A first-touch key is colder than every victim candidate
        assert!(!cache.insert(4, 40, Duration::from_secs(60)).await);
        assert_eq!(cache.get(&4).await, None);
        assert_eq!(cache.stats().rejections(), 1);

        // The resident set survived the scan
        assert_eq!(cache.get(&1).await, Some(10));
        assert_eq!(cache.get(&2).await, Some(20));
        assert_eq!(cache.get(&3).await, Some(30));
    }

    #[tokio::test]
    async fn test_repeated_candidate_eventually_admitted() {
        let cache: AdmissionCache<i32, i32> = AdmissionCache::new(2);

        cache.insert(1, 10, Duration::from_secs(60)).await;
        cache.insert(2, 20, Duration::from_secs(60)).await;
        cache.get(&1).await;
        cache.get(&2).await;

        // First attempt is colder than both residents and bounces; each
        // attempt still counts as a touch, so persistence wins
        assert!(!cache.insert(3, 30, Duration::from_secs(60)).await);
        assert!(cache.insert(3, 30, Duration::from_secs(60)).await);
        assert_eq!(cache.get(&3).await, Some(30));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_resident_update_bypasses_admission() {
        let cache: AdmissionCache<i32, i32> = AdmissionCache::new(2);

        cache.insert(1, 10, Duration::from_secs(60)).await;
        cache.insert(2, 20, Duration::from_secs(60)).await;

        // Updating a resident key is not a displacement
        assert!(cache.insert(1, 11, Duration::from_secs(60)).await);
        assert_eq!(cache.get(&1).await, Some(11));
        assert_eq!(cache.len().await, 2);
    }

    #[test]
    fn test_frequency_aging_halves_counts() {
        let mut counters = FrequencyCounters::new(1000);
        let hash = hash_key(&"hot");

        for _ in 0..8 {
            counters.touch(hash);
        }
        assert_eq!(counters.estimate(hash), 8);

        counters.age();
        assert_eq!(counters.estimate(hash), 4);

        // Aging prunes keys whose count reaches zero
        let cold = hash_key(&"cold");
        counters.touch(cold);
        counters.age();
        counters.age();
        assert_eq!(counters.estimate(cold), 0);
    }

    #[test]
    fn test_frequency_saturates() {
        let mut counters = FrequencyCounters::new(1000);
        let hash = hash_key(&"very-hot");
        for _ in 0..100 {
            counters.touch(hash);
        }
        assert!(counters.estimate(hash) <= MAX_FREQUENCY);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache: AdmissionCache<String, i32> = AdmissionCache::new(10);

        cache.insert("fast".into(), 1, Duration::from_millis(10)).await;
        cache.insert("slow".into(), 2, Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get(&"fast".to_string()).await, None);
        assert_eq!(cache.get(&"slow".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn test_multilayer_l2_hit_repopulates_l1() {
        let l2 = Arc::new(MemoryKv::new());
        let cache = MultiLayerCache::new(16, l2.clone());

        // Value present only in L2
        l2.set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        // Second read is an L1 hit
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.l1_stats().hits(), 1);
    }

    #[tokio::test]
    async fn test_multilayer_write_through_and_delete() {
        let l2 = Arc::new(MemoryKv::new());
        let cache = MultiLayerCache::new(16, l2.clone());

        cache.set("k", b"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(l2.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(l2.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multilayer_l1_rejection_still_serves_from_l2() {
        let l2 = Arc::new(MemoryKv::new());
        let cache = MultiLayerCache::new(2, l2.clone());

        // Two warm residents fill L1
        cache.set("a", b"1", Duration::from_secs(60)).await.unwrap();
        cache.set("b", b"2", Duration::from_secs(60)).await.unwrap();
        cache.get("a").await.unwrap();
        cache.get("b").await.unwrap();

        // A cold write may bounce off L1, but L2 always has it
        cache.set("c", b"3", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("c").await.unwrap(), Some(b"3".to_vec()));
        assert_eq!(l2.get("c").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_get_or_load_only_loads_on_miss() {
        let cache = layered();

        let loaded = cache
            .get_or_load("k", Duration::from_secs(60), || async {
                Ok(b"loaded".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(loaded, b"loaded");

        // Loader must not run again
        let cached = cache
            .get_or_load("k", Duration::from_secs(60), || async {
                panic!("loader ran on a cache hit")
            })
            .await
            .unwrap();
        assert_eq!(cached, b"loaded");
    }

    #[tokio::test]
    async fn test_did_key_cache_roundtrip() {
        let cache = DidKeyCache::new(16, Arc::new(MemoryKv::new()));
        let key = [9u8; 32];

        cache
            .set("did:key:zTest", &key, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("did:key:zTest").await.unwrap(), Some(key));

        cache.invalidate("did:key:zTest").await.unwrap();
        assert_eq!(cache.get("did:key:zTest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_did_key_cache_rejects_corrupt_entry() {
        let l2 = Arc::new(MemoryKv::new());
        let cache = DidKeyCache::new(16, l2.clone());

        l2.set_with_ttl("did:did:web:x", b"short", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.get("did:web:x").await.is_err());
    }
}
