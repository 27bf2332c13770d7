//! In-memory translation result cache with TTL.
//! Key: (source code, target code, blake3 of normalized input).
//! Capacity 100, TTL 24h by default.
//!
//! Eviction is by creation time, not by access: reads use `peek`, so the
//! LRU order inside `LruCache` is insertion order and the evicted tail is
//! always the entry created longest ago.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::record::TranslationRecord;

/// Cache key for one translation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_lang: String,
    pub target_lang: String,
    pub input_hash: [u8; 32],
}

impl CacheKey {
    /// Build a key from already-normalized codes and input.
    pub fn new(source_lang: &str, target_lang: &str, normalized_input: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            input_hash: *blake3::hash(normalized_input.as_bytes()).as_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub record: TranslationRecord,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() < ttl
    }
}

pub struct ResultCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a cached result. Returns None if absent or expired; an expired
    /// entry is removed.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut cache = self.inner.lock();
        let entry = cache.peek(key)?;
        if entry.is_valid(self.ttl) {
            return Some(entry.clone());
        }
        cache.pop(key);
        debug!(source = %key.source_lang, target = %key.target_lang, "expired cache entry dropped");
        None
    }

    /// Insert or overwrite. Overwriting restamps `created_at`.
    pub fn put(&self, key: CacheKey, record: TranslationRecord) {
        let mut cache = self.inner.lock();
        let entry = CacheEntry {
            record,
            created_at: Instant::now(),
        };
        if let Some((evicted_key, evicted)) = cache.push(key.clone(), entry) {
            if evicted_key != key {
                debug!(
                    record_id = %evicted.record.id,
                    age_ms = evicted.created_at.elapsed().as_millis() as u64,
                    "cache full, evicted oldest entry"
                );
            }
        }
    }

    /// Replace the cached copy of `record` wherever it appears, keeping each
    /// entry's `created_at`.
    pub fn refresh_record(&self, record: &TranslationRecord) {
        let mut cache = self.inner.lock();
        for (_, entry) in cache.iter_mut() {
            if entry.record.id == record.id {
                entry.record = record.clone();
            }
        }
    }

    /// Drop every entry that points at `record_id`. Returns how many went.
    pub fn invalidate_record(&self, record_id: &str) -> usize {
        let mut cache = self.inner.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| entry.record.id == record_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    /// Remove every expired entry. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.inner.lock();
        let expired: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| !entry.is_valid(self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().contains(key)
    }
}
