//! Translation cache (spec §4.4 "front-end translation cache", §6
//! "Persisted state"). Grounded in `cache.py`'s `TranslationCache`: a
//! bounded LRU keyed on `(normalized source text, source lang, target lang)`
//! with an optional TTL, short-circuiting exact-match queries before any
//! backend call, plus an optional JSON disk snapshot loaded at startup and
//! saved at shutdown or on demand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::translation::types::TranslationResult;

type CacheKey = (String, String, String);

fn normalize_key(source_text: &str, source_lang: &str, target_lang: &str) -> CacheKey {
    (
        source_text.trim().to_lowercase(),
        source_lang.to_lowercase(),
        target_lang.to_lowercase(),
    )
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// On-disk representation of one cache entry (spec §6 persisted state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryRecord {
    pub source_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timestamp: f64,
    pub hit_count: u64,
}

struct CacheEntry {
    translated_text: String,
    timestamp: f64,
    hit_count: u64,
}

/// Bounded LRU cache for translations, with optional TTL and optional disk
/// persistence. Single-threaded API; callers share one instance behind a
/// mutex (spec §5: "the translation cache... the only cross-thread mutable
/// data... guarded by one mutex").
pub struct TranslationCache {
    max_size: usize,
    ttl_secs: Option<u64>,
    entries: HashMap<CacheKey, CacheEntry>,
    /// Most-recently-used key at the back.
    access_order: Vec<CacheKey>,
    hits: u64,
    misses: u64,
    puts: u64,
}

impl TranslationCache {
    pub fn new(max_size: usize, ttl_secs: Option<u64>) -> Self {
        Self {
            max_size: max_size.max(1),
            ttl_secs,
            entries: HashMap::new(),
            access_order: Vec::new(),
            hits: 0,
            misses: 0,
            puts: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push(key.clone());
    }

    fn evict_lru_if_needed(&mut self) {
        while self.entries.len() >= self.max_size && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.entries.remove(&oldest);
        }
    }

    /// Returns the cached translated text if present, not expired, and not
    /// evicted (spec §8 "cache idempotence").
    pub fn get(&mut self, source_text: &str, source_lang: &str, target_lang: &str) -> Option<String> {
        let key = normalize_key(source_text, source_lang, target_lang);

        let expired = match (self.entries.get(&key), self.ttl_secs) {
            (Some(entry), Some(ttl)) => now_secs() - entry.timestamp > ttl as f64,
            _ => false,
        };
        if expired {
            self.entries.remove(&key);
            self.access_order.retain(|k| k != &key);
            self.misses += 1;
            return None;
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.hit_count += 1;
            let text = entry.translated_text.clone();
            self.touch(&key);
            self.hits += 1;
            Some(text)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Inserts/overwrites a translation, evicting LRU entries if the cache
    /// is at capacity.
    pub fn put(&mut self, source_text: &str, source_lang: &str, target_lang: &str, translated_text: &str) {
        let key = normalize_key(source_text, source_lang, target_lang);
        if !self.entries.contains_key(&key) {
            self.evict_lru_if_needed();
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                translated_text: translated_text.to_string(),
                timestamp: now_secs(),
                hit_count: 0,
            },
        );
        self.touch(&key);
        self.puts += 1;
    }

    /// Loads entries from a `translation_cache.json` file in `dir`, skipping
    /// any already-expired by TTL. Missing file is not an error (first run).
    pub fn load_from_dir(&mut self, dir: &Path) -> Result<()> {
        let path = cache_file_path(dir);
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read translation cache at {}", path.display()))?;
        let records: Vec<CacheEntryRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse translation cache at {}", path.display()))?;

        let now = now_secs();
        for record in records {
            if let Some(ttl) = self.ttl_secs {
                if now - record.timestamp > ttl as f64 {
                    continue;
                }
            }
            let key = normalize_key(&record.source_text, &record.source_lang, &record.target_lang);
            self.evict_lru_if_needed();
            self.entries.insert(
                key.clone(),
                CacheEntry {
                    translated_text: record.translated_text,
                    timestamp: record.timestamp,
                    hit_count: record.hit_count,
                },
            );
            self.touch(&key);
        }
        Ok(())
    }

    /// Saves the current cache contents as `translation_cache.json` in
    /// `dir`, creating the directory if needed.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        let records: Vec<CacheEntryRecord> = self
            .entries
            .iter()
            .map(|((source_text, source_lang, target_lang), entry)| CacheEntryRecord {
                source_text: source_text.clone(),
                translated_text: entry.translated_text.clone(),
                source_lang: source_lang.clone(),
                target_lang: target_lang.clone(),
                timestamp: entry.timestamp,
                hit_count: entry.hit_count,
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)?;
        let path = cache_file_path(dir);
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write translation cache at {}", path.display()))?;
        Ok(())
    }

    /// Wraps `result` as a cacheable translation if it produced text, then
    /// returns it unchanged. Convenience for callers that just translated a
    /// miss and want the cache updated and the result passed through.
    pub fn remember(&mut self, result: &TranslationResult) {
        if let Some(text) = &result.translated_text {
            self.put(&result.source_text, &result.source_lang, &result.target_lang, text);
        }
    }
}

fn cache_file_path(dir: &Path) -> PathBuf {
    dir.join("translation_cache.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = TranslationCache::new(8, None);
        cache.put("Hello", "en", "es", "Hola");
        assert_eq!(cache.get("hello", "en", "es"), Some("Hola".to_string()));
        assert_eq!(cache.get("  Hello  ", "EN", "ES"), Some("Hola".to_string()));
    }

    #[test]
    fn miss_is_reported_distinctly_from_hit() {
        let mut cache = TranslationCache::new(8, None);
        assert_eq!(cache.get("nope", "en", "es"), None);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn lru_eviction_drops_oldest_entry_first() {
        let mut cache = TranslationCache::new(2, None);
        cache.put("a", "en", "es", "a-es");
        cache.put("b", "en", "es", "b-es");
        cache.put("c", "en", "es", "c-es");
        assert_eq!(cache.get("a", "en", "es"), None);
        assert_eq!(cache.get("b", "en", "es"), Some("b-es".to_string()));
        assert_eq!(cache.get("c", "en", "es"), Some("c-es".to_string()));
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let mut cache = TranslationCache::new(8, Some(0));
        cache.put("hello", "en", "es", "hola");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(cache.get("hello", "en", "es"), None);
    }

    #[test]
    fn save_and_load_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TranslationCache::new(8, None);
        cache.put("hello", "en", "es", "hola");
        cache.save_to_dir(dir.path()).unwrap();

        let mut loaded = TranslationCache::new(8, None);
        loaded.load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.get("hello", "en", "es"), Some("hola".to_string()));
    }
}
