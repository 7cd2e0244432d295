//! Audio byte cache.
//!
//! LRU over 128-bit content digests with an optional absolute TTL. One
//! mutex guards the bookkeeping; values are reference-counted immutable
//! buffers so readers never hold the lock while the bytes are in flight.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::audio::AudioFormat;

/// 128-bit content digest identifying one synthesis result.
pub type CacheKey = [u8; 16];

/// Derive the cache key for a request tuple.
pub fn cache_key(text: &str, voice: &str, speed: f32, format: AudioFormat) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(voice.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(&speed.to_le_bytes());
    hasher.update(&[0x1f]);
    hasher.update(format.as_str().as_bytes());
    let mut key = [0u8; 16];
    key.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
    key
}

/// One cached synthesis result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Arc<Vec<u8>>,
    pub voice: String,
    pub format: AudioFormat,
    pub speed: f32,
    pub inserted_at: Instant,
    last_used: u64,
}

/// Thread-safe audio LRU.
pub struct AudioCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Option<Duration>,
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

/// Aggregate counters for the stats surfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

impl AudioCache {
    /// `ttl_seconds` of 0 disables expiry.
    pub fn new(max_entries: usize, ttl_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), clock: 0, hits: 0, misses: 0 }),
            max_entries: max_entries.max(1),
            ttl: (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds)),
        }
    }

    /// Fetch a shared handle to the cached bytes, refreshing recency.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<u8>>> {
        let mut inner = self.inner.lock().expect("audio cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;

        let expired = match inner.entries.get(key) {
            Some(entry) => self.ttl.is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
            None => {
                inner.misses += 1;
                return None;
            }
        };
        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            return None;
        }

        let entry = inner.entries.get_mut(key).expect("entry checked above");
        entry.last_used = clock;
        let bytes = entry.bytes.clone();
        inner.hits += 1;
        Some(bytes)
    }

    /// Insert (or overwrite) an entry. Content-identical overwrites from
    /// concurrent misses are expected and harmless.
    pub fn put(&self, key: CacheKey, bytes: Vec<u8>, voice: &str, speed: f32, format: AudioFormat) {
        let mut inner = self.inner.lock().expect("audio cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;
        inner.entries.insert(
            key,
            CacheEntry {
                bytes: Arc::new(bytes),
                voice: voice.to_string(),
                format,
                speed,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );

        while inner.entries.len() > self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k);
            match oldest {
                Some(key) => {
                    inner.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().expect("audio cache lock poisoned").entries.contains_key(key)
    }

    pub fn clear(&self) {
        self.inner.lock().expect("audio cache lock poisoned").entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("audio cache lock poisoned");
        CacheStats { entries: inner.entries.len(), hits: inner.hits, misses: inner.misses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(text: &str) -> CacheKey {
        cache_key(text, "af_heart", 1.0, AudioFormat::Mp3)
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(key_for("hello"), key_for("hello"));
        assert_ne!(key_for("hello"), key_for("world"));
        assert_ne!(
            cache_key("hi", "af_heart", 1.0, AudioFormat::Mp3),
            cache_key("hi", "af_heart", 1.5, AudioFormat::Mp3),
        );
        assert_ne!(
            cache_key("hi", "af_heart", 1.0, AudioFormat::Mp3),
            cache_key("hi", "af_heart", 1.0, AudioFormat::Wav),
        );
        assert_ne!(
            cache_key("hi", "af_heart", 1.0, AudioFormat::Mp3),
            cache_key("hi", "am_puck", 1.0, AudioFormat::Mp3),
        );
    }

    #[test]
    fn field_separator_prevents_ambiguity() {
        assert_ne!(
            cache_key("ab", "c", 1.0, AudioFormat::Mp3),
            cache_key("a", "bc", 1.0, AudioFormat::Mp3),
        );
    }

    #[test]
    fn put_get_roundtrip() {
        let cache = AudioCache::new(10, 0);
        let key = key_for("hello");
        assert!(cache.get(&key).is_none());

        cache.put(key, vec![1, 2, 3], "af_heart", 1.0, AudioFormat::Mp3);
        assert_eq!(cache.get(&key).as_deref(), Some(&vec![1, 2, 3]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn lru_eviction() {
        let cache = AudioCache::new(2, 0);
        let (k1, k2, k3) = (key_for("one"), key_for("two"), key_for("three"));
        cache.put(k1, vec![1], "v", 1.0, AudioFormat::Wav);
        cache.put(k2, vec![2], "v", 1.0, AudioFormat::Wav);
        cache.get(&k1); // k2 becomes the eviction candidate
        cache.put(k3, vec![3], "v", 1.0, AudioFormat::Wav);

        assert!(cache.contains(&k1));
        assert!(!cache.contains(&k2));
        assert!(cache.contains(&k3));
    }

    #[test]
    fn ttl_expiry() {
        // ttl of 0 means no expiry
        let cache = AudioCache::new(4, 0);
        let key = key_for("stays");
        cache.put(key, vec![1], "v", 1.0, AudioFormat::Wav);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn overwrite_keeps_single_entry() {
        let cache = AudioCache::new(4, 0);
        let key = key_for("dup");
        cache.put(key, vec![1], "v", 1.0, AudioFormat::Wav);
        cache.put(key, vec![1], "v", 1.0, AudioFormat::Wav);
        assert_eq!(cache.stats().entries, 1);
    }
}
