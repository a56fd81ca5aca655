//! Bounded in-memory cache for raw blobs, metadata and derived outputs.
//!
//! Raw blobs tend to be read uniformly, while derived outputs (the popular
//! thumbnail size, say) arrive in frequency-skewed bursts. A fixed LRU lets
//! one burst of one-off reads flush the hot thumbnails, and a fixed LFU keeps
//! stale favourites forever. The cache uses Adaptive Replacement (ARC)
//! instead, which moves its recency/frequency split based on which side the
//! recent misses would have hit.
//!
//! # Design
//!
//! [`ArcCache`] keeps four LRU-ordered key lists:
//!
//! - **T1**: resident keys seen once recently (recency side)
//! - **T2**: resident keys seen at least twice (frequency side)
//! - **B1 / B2**: ghost keys recently evicted from T1 / T2, values dropped
//!
//! A miss that lands in B1 means T1 was too small, so the target size `p` of
//! T1 grows. A miss in B2 shrinks it. Capacity counts entries, not bytes, so
//! a large derived image and a tiny metadata record each take one slot.
//!
//! [`MediaCache`] wraps the policy in a `parking_lot::Mutex` and stores
//! [`CacheEntry`] values. The lock is only held for a single lookup or
//! insert, never while an image is being decoded or encoded.
//!
//! ## Keys
//!
//! | Entry | Key |
//! |---|---|
//! | raw blob | `<key>` |
//! | metadata | `<key>.json` |
//! | derived output | `<key>:<mime>:<modifier>:<canonical query>` |

use crate::error::{MediaError, Result};
use crate::types::{CacheEntry, ObjectMeta};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix appended to a content key to form its metadata cache key.
const META_SUFFIX: &str = ".json";

/// Cache key under which an object's metadata is stored.
pub fn meta_key(key: &str) -> String {
    format!("{key}{META_SUFFIX}")
}

// =============================================================================
// LRU-ordered key list
// =============================================================================

/// Keys in least-recently-used order.
///
/// Each key carries a monotonically increasing stamp; the smallest stamp is
/// the LRU end.
#[derive(Debug)]
struct LruList<K> {
    order: BTreeMap<u64, K>,
    stamps: HashMap<K, u64>,
    next: u64,
}

impl<K: Eq + Hash + Clone> LruList<K> {
    fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            stamps: HashMap::new(),
            next: 0,
        }
    }

    fn len(&self) -> usize {
        self.stamps.len()
    }

    fn contains(&self, key: &K) -> bool {
        self.stamps.contains_key(key)
    }

    /// Insert `key` at the MRU end, moving it there if already present.
    fn push_mru(&mut self, key: K) {
        if let Some(old) = self.stamps.remove(&key) {
            self.order.remove(&old);
        }
        let stamp = self.next;
        self.next += 1;
        self.order.insert(stamp, key.clone());
        self.stamps.insert(key, stamp);
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.stamps.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    fn pop_lru(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.stamps.remove(&key);
        Some(key)
    }

    fn keys_matching(&self, pred: &impl Fn(&K) -> bool) -> Vec<K> {
        self.stamps.keys().filter(|k| pred(k)).cloned().collect()
    }
}

// =============================================================================
// Adaptive replacement policy
// =============================================================================

/// Fixed-capacity cache with adaptive recency/frequency balancing.
///
/// See the [module docs](self) for the list layout.
#[derive(Debug)]
pub struct ArcCache<K, V> {
    capacity: usize,
    /// Target size of T1.
    p: usize,
    t1: LruList<K>,
    t2: LruList<K>,
    b1: LruList<K>,
    b2: LruList<K>,
    values: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> ArcCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get(),
            p: 0,
            t1: LruList::new(),
            t2: LruList::new(),
            b1: LruList::new(),
            b2: LruList::new(),
            values: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether `key` is resident. Does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.t1.contains(key) || self.t2.contains(key)
    }

    /// Look up `key`, promoting it to the frequency side on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.t1.remove(key) {
            self.t2.push_mru(key.clone());
        } else if self.t2.contains(key) {
            self.t2.push_mru(key.clone());
        } else {
            return None;
        }
        self.values.get(key)
    }

    pub fn put(&mut self, key: K, value: V) {
        // Resident: refresh the value and count the access.
        if self.t1.remove(&key) || self.t2.contains(&key) {
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        if self.b1.contains(&key) {
            // Recency ghost hit: T1 deserved more room.
            let delta = if self.b2.len() > self.b1.len() {
                self.b2.len() / self.b1.len()
            } else {
                1
            };
            self.p = (self.p + delta).min(self.capacity);
            if self.values.len() >= self.capacity {
                self.replace(false);
            }
            self.b1.remove(&key);
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        if self.b2.contains(&key) {
            // Frequency ghost hit: T2 deserved more room.
            let delta = if self.b1.len() > self.b2.len() {
                self.b1.len() / self.b2.len()
            } else {
                1
            };
            self.p = self.p.saturating_sub(delta);
            if self.values.len() >= self.capacity {
                self.replace(true);
            }
            self.b2.remove(&key);
            self.t2.push_mru(key.clone());
            self.values.insert(key, value);
            return;
        }

        if self.values.len() >= self.capacity {
            self.replace(false);
        }
        if self.b1.len() > self.capacity - self.p {
            self.b1.pop_lru();
        }
        if self.b2.len() > self.p {
            self.b2.pop_lru();
        }
        self.t1.push_mru(key.clone());
        self.values.insert(key, value);
    }

    /// Drop `key` from every list, returning its value if it was resident.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.t1.remove(key);
        self.t2.remove(key);
        self.b1.remove(key);
        self.b2.remove(key);
        self.values.remove(key)
    }

    /// Drop every key (resident or ghost) matching `pred`. Returns how many
    /// resident entries were removed.
    pub fn remove_where(&mut self, pred: impl Fn(&K) -> bool) -> usize {
        let mut doomed = self.t1.keys_matching(&pred);
        doomed.extend(self.t2.keys_matching(&pred));
        doomed.extend(self.b1.keys_matching(&pred));
        doomed.extend(self.b2.keys_matching(&pred));
        doomed
            .iter()
            .filter(|k| self.remove(k).is_some())
            .count()
    }

    /// Evict one resident entry into the matching ghost list.
    fn replace(&mut self, in_b2: bool) {
        let t1_len = self.t1.len();
        let from_t1 = t1_len > 0 && (t1_len > self.p || (t1_len == self.p && in_b2));

        let victim = if from_t1 {
            self.t1.pop_lru().map(|k| (k, true))
        } else {
            self.t2
                .pop_lru()
                .map(|k| (k, false))
                .or_else(|| self.t1.pop_lru().map(|k| (k, true)))
        };

        if let Some((key, was_t1)) = victim {
            self.values.remove(&key);
            let ghosts = if was_t1 { &mut self.b1 } else { &mut self.b2 };
            ghosts.push_mru(key);
            if ghosts.len() > self.capacity {
                ghosts.pop_lru();
            }
        }
    }
}

// =============================================================================
// Typed media cache
// =============================================================================

/// Thread-safe cache of [`CacheEntry`] values keyed by string.
pub struct MediaCache {
    inner: Mutex<ArcCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MediaCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| MediaError::InvalidInput("cache capacity must be positive".into()))?;
        Ok(Self {
            inner: Mutex::new(ArcCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Untyped lookup. Prefer the typed getters, which enforce the tag.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let found = self.inner.lock().get(&key.to_string()).cloned();
        self.record(found.is_some());
        found
    }

    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        self.inner.lock().put(key.into(), entry);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(&key.to_string())
    }

    pub fn get_raw(&self, key: &str) -> Option<Bytes> {
        self.get_tagged(key, |entry| match entry {
            CacheEntry::RawBlob(data) => Some(data.clone()),
            _ => None,
        })
    }

    pub fn get_meta(&self, key: &str) -> Option<ObjectMeta> {
        self.get_tagged(&meta_key(key), |entry| match entry {
            CacheEntry::Metadata(meta) => Some(meta.clone()),
            _ => None,
        })
    }

    pub fn get_derived(&self, composite_key: &str) -> Option<Bytes> {
        self.get_tagged(composite_key, |entry| match entry {
            CacheEntry::DerivedBlob(data) => Some(data.clone()),
            _ => None,
        })
    }

    /// Drop every entry belonging to content key `key`: its raw blob, its
    /// metadata and all derived outputs.
    pub fn invalidate(&self, key: &str) {
        let meta = meta_key(key);
        let derived_prefix = format!("{key}:");
        let removed = self
            .inner
            .lock()
            .remove_where(|k| k == key || *k == meta || k.starts_with(&derived_prefix));
        tracing::debug!(key, removed, "invalidated cache entries");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.len(),
            capacity: inner.capacity(),
        }
    }

    /// Look up `key` and project it through `extract`. A resident entry of
    /// the wrong kind is purged and reported as a miss.
    fn get_tagged<T>(&self, key: &str, extract: impl Fn(&CacheEntry) -> Option<T>) -> Option<T> {
        let key = key.to_string();
        let mut inner = self.inner.lock();
        let found = inner.get(&key).map(|entry| (extract(entry), entry.tag()));
        let result = match found {
            Some((Some(value), _)) => Some(value),
            Some((None, tag)) => {
                tracing::warn!(key = %key, tag, "cache entry has unexpected kind, purging");
                inner.remove(&key);
                None
            }
            None => None,
        };
        drop(inner);
        self.record(result.is_some());
        result
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time summary of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lookups() > 0 {
            write!(
                f,
                "{} hits, {} misses ({}/{} entries)",
                self.hits, self.misses, self.entries, self.capacity
            )
        } else {
            write!(f, "{}/{} entries", self.entries, self.capacity)
        }
    }
}
