//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use translation_history::store::{MemoryRecordStore, RecordStore, StoreError};
use translation_history::{Config, NewTranslation, TranslateError, TranslationRecord, Translator};

/// Translator that answers from a fixed table and counts calls.
#[derive(Default)]
pub struct FakeTranslator {
    answers: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, text: &str, translated: &str) {
        self.answers.lock().insert(text.to_string(), translated.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    fn provider(&self) -> &str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TranslateError::Api("upstream returned 503".into()));
        }
        Ok(self
            .answers
            .lock()
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[zh] {text}")))
    }
}

/// Memory store whose substring search can be slowed per query or made to
/// fail, for driving the search pipeline.
#[derive(Default)]
pub struct SlowStore {
    inner: MemoryRecordStore,
    search_delays: Mutex<HashMap<String, Duration>>,
    search_failing: AtomicBool,
}

impl SlowStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay_search(&self, query: &str, delay: Duration) {
        self.search_delays.lock().insert(query.to_string(), delay);
    }

    pub fn fail_searches(&self, failing: bool) {
        self.search_failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn insert(&self, record: &TranslationRecord) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }
    async fn insert_batch(&self, records: &[TranslationRecord]) -> Result<(), StoreError> {
        self.inner.insert_batch(records).await
    }
    async fn get_by_id(&self, id: &str) -> Result<Option<TranslationRecord>, StoreError> {
        self.inner.get_by_id(id).await
    }
    async fn update_favorite(&self, id: &str, favorite: bool) -> Result<usize, StoreError> {
        self.inner.update_favorite(id, favorite).await
    }
    async fn favorite_within_limit(&self, id: &str, limit: usize) -> Result<usize, StoreError> {
        self.inner.favorite_within_limit(id, limit).await
    }
    async fn update_tags(&self, id: &str, tags: &[String]) -> Result<usize, StoreError> {
        self.inner.update_tags(id, tags).await
    }
    async fn record_access(
        &self,
        id: &str,
        now_ms: i64,
        increment_usage: bool,
    ) -> Result<usize, StoreError> {
        self.inner.record_access(id, now_ms, increment_usage).await
    }
    async fn touch(&self, ids: &[String], now_ms: i64) -> Result<usize, StoreError> {
        self.inner.touch(ids, now_ms).await
    }
    async fn delete_by_id(&self, id: &str) -> Result<usize, StoreError> {
        self.inner.delete_by_id(id).await
    }
    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.inner.delete_by_ids(ids).await
    }
    async fn delete_all(&self) -> Result<usize, StoreError> {
        self.inner.delete_all().await
    }
    async fn delete_non_favorites(&self) -> Result<usize, StoreError> {
        self.inner.delete_non_favorites().await
    }
    async fn delete_older_than(&self, cutoff_ms: i64, keep_favorites: bool) -> Result<usize, StoreError> {
        self.inner.delete_older_than(cutoff_ms, keep_favorites).await
    }
    async fn query_all(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        self.inner.query_all().await
    }
    async fn query_favorites(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        self.inner.query_favorites().await
    }
    async fn query_substring_match(&self, query: &str) -> Result<Vec<TranslationRecord>, StoreError> {
        let delay = self.search_delays.lock().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.search_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("index offline".into()));
        }
        self.inner.query_substring_match(query).await
    }
    async fn query_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        self.inner.query_time_range(start_ms, end_ms).await
    }
    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
    async fn favorite_count(&self) -> Result<usize, StoreError> {
        self.inner.favorite_count().await
    }
}

pub fn en_zh(original: &str, translated: &str) -> NewTranslation {
    NewTranslation {
        original_text: original.into(),
        translated_text: translated.into(),
        source_language_code: "en".into(),
        target_language_code: "zh".into(),
        source_language_name: "English".into(),
        target_language_name: "Chinese".into(),
        provider: "google".into(),
        tags: Vec::new(),
    }
}

/// Defaults, but without touching search matches so stored records stay
/// exactly as saved.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.search.touch_matches = false;
    config
}
