//! Phonetic lookup cache.
//!
//! Bounded LRU over `(word, notation, accent)` → rendered pronunciation,
//! owned by the normalization pipeline. Persistable to a JSON sidecar so
//! dictionary lookups survive restarts. Words shorter than 2 characters
//! are never cached.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Minimum word length worth caching.
const MIN_WORD_LEN: usize = 2;

/// Lookup key: word plus the notation/accent pair the rendering depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneticKey {
    pub word: String,
    pub notation: String,
    pub accent: String,
}

impl PhoneticKey {
    pub fn new(word: &str, notation: &str, accent: &str) -> Self {
        Self {
            word: word.to_lowercase(),
            notation: notation.to_string(),
            accent: accent.to_string(),
        }
    }

    fn sidecar_key(&self) -> String {
        format!("{}|{}|{}", self.word, self.notation, self.accent)
    }

    fn from_sidecar_key(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        Some(Self {
            word: parts.next()?.to_string(),
            notation: parts.next()?.to_string(),
            accent: parts.next()?.to_string(),
        })
    }
}

/// Bounded LRU cache of rendered pronunciations.
#[derive(Debug)]
pub struct PhoneticCache {
    entries: HashMap<PhoneticKey, Entry>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    last_used: u64,
}

impl PhoneticCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &PhoneticKey) -> Option<String> {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = clock;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: PhoneticKey, value: String) {
        if key.word.chars().count() < MIN_WORD_LEN {
            return;
        }
        self.clock += 1;
        self.entries.insert(key, Entry { value, last_used: self.clock });
        if self.entries.len() > self.capacity {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Persist current entries to a JSON sidecar.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let map: HashMap<String, &str> = self
            .entries
            .iter()
            .map(|(k, e)| (k.sidecar_key(), e.value.as_str()))
            .collect();
        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }

    /// Load entries from a sidecar, ignoring malformed keys.
    pub fn load(&mut self, path: &Path) -> std::io::Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let map: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut loaded = 0;
        for (k, v) in map {
            if let Some(key) = PhoneticKey::from_sidecar_key(&k) {
                self.put(key, v);
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_roundtrip() {
        let mut cache = PhoneticCache::new(10);
        let key = PhoneticKey::new("cache", "ipa", "en-us");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), "KASH".into());
        assert_eq!(cache.get(&key).as_deref(), Some("KASH"));
    }

    #[test]
    fn short_words_never_cached() {
        let mut cache = PhoneticCache::new(10);
        cache.put(PhoneticKey::new("a", "ipa", "en-us"), "ay".into());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = PhoneticCache::new(2);
        let k1 = PhoneticKey::new("alpha", "ipa", "us");
        let k2 = PhoneticKey::new("bravo", "ipa", "us");
        let k3 = PhoneticKey::new("charlie", "ipa", "us");
        cache.put(k1.clone(), "1".into());
        cache.put(k2.clone(), "2".into());
        cache.get(&k1); // refresh k1; k2 is now oldest
        cache.put(k3.clone(), "3".into());
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn keys_distinguish_notation_and_accent() {
        let mut cache = PhoneticCache::new(10);
        cache.put(PhoneticKey::new("tomato", "ipa", "en-us"), "tomayto".into());
        cache.put(PhoneticKey::new("tomato", "ipa", "en-gb"), "tomahto".into());
        assert_eq!(cache.get(&PhoneticKey::new("tomato", "ipa", "en-us")).as_deref(), Some("tomayto"));
        assert_eq!(cache.get(&PhoneticKey::new("tomato", "ipa", "en-gb")).as_deref(), Some("tomahto"));
    }

    #[test]
    fn sidecar_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("phonetic_cache.json");

        let mut cache = PhoneticCache::new(10);
        cache.put(PhoneticKey::new("niche", "ipa", "en-us"), "NEESH".into());
        cache.save(&path).expect("save");

        let mut restored = PhoneticCache::new(10);
        let loaded = restored.load(&path).expect("load");
        assert_eq!(loaded, 1);
        assert_eq!(
            restored.get(&PhoneticKey::new("niche", "ipa", "en-us")).as_deref(),
            Some("NEESH")
        );
    }
}
