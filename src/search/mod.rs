//! History search: candidate fetch, weighted ranking and highlighting.
//! `pipeline` turns a stream of keystroke queries into a stream of results.

pub mod pipeline;
pub mod scoring;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::record::{now_millis, TranslationRecord};
use crate::store::RecordStore;
use scoring::{find_ignore_case, score_record, HighlightSpan};

/// Queries shorter than this (after trimming) are treated as empty.
pub const MIN_QUERY_CHARS: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub record: TranslationRecord,
    pub score: f64,
    /// None when the query does not literally occur in the original text
    /// (the record may still rank through tags or language names).
    pub original_highlight: Option<HighlightSpan>,
    pub translated_highlight: Option<HighlightSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    /// Blank query; nothing was searched.
    Empty,
    NoResults {
        query: String,
    },
    Success {
        query: String,
        items: Vec<RankedItem>,
        /// Ranked candidates before truncation to `max_results`.
        total_count: usize,
    },
    Error {
        query: String,
        message: String,
    },
}

impl SearchState {
    /// Query this state answers; None for `Empty`.
    pub fn query(&self) -> Option<&str> {
        match self {
            SearchState::Empty => None,
            SearchState::NoResults { query }
            | SearchState::Success { query, .. }
            | SearchState::Error { query, .. } => Some(query),
        }
    }
}

/// Score, order and highlight candidates. Ties go to the newer record.
pub fn rank(candidates: Vec<TranslationRecord>, query: &str, now_ms: i64) -> Vec<RankedItem> {
    let mut items: Vec<RankedItem> = candidates
        .into_iter()
        .map(|record| RankedItem {
            score: score_record(&record, query, now_ms),
            original_highlight: find_ignore_case(&record.original_text, query),
            translated_highlight: find_ignore_case(&record.translated_text, query),
            record,
        })
        .collect();
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
    });
    items
}

pub struct SearchEngine {
    store: Arc<dyn RecordStore>,
    metrics: Arc<MetricsRegistry>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        metrics: Arc<MetricsRegistry>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run one query to completion. Store failures become `SearchState::Error`.
    pub async fn search(&self, query: &str) -> SearchState {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return SearchState::Empty;
        }

        let span = self.metrics.span(metric_names::SEARCH_DONE);
        let candidates = match self.store.query_substring_match(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.metrics.increment(metric_names::STORE_ERROR);
                warn!(query, error = %e, "search candidate fetch failed");
                return SearchState::Error {
                    query: query.to_string(),
                    message: e.to_string(),
                };
            }
        };
        self.metrics
            .record(metric_names::SEARCH_CANDIDATES, candidates.len() as f64);

        if candidates.is_empty() {
            span.finish();
            return SearchState::NoResults {
                query: query.to_string(),
            };
        }

        let now = now_millis();
        let mut items = rank(candidates, query, now);
        let total_count = items.len();
        items.truncate(self.config.max_results);

        if self.config.touch_matches {
            self.touch_matches(&mut items, now).await;
        }

        let elapsed_us = span.finish();
        debug!(query, total_count, elapsed_us, "search complete");
        SearchState::Success {
            query: query.to_string(),
            items,
            total_count,
        }
    }

    /// Bump last access on returned records. Failure only costs recency data.
    async fn touch_matches(&self, items: &mut [RankedItem], now: i64) {
        let ids: Vec<String> = items.iter().map(|item| item.record.id.clone()).collect();
        match self.store.touch(&ids, now).await {
            Ok(_) => {
                for item in items.iter_mut() {
                    item.record.last_access_time = now.max(item.record.timestamp);
                }
            }
            Err(e) => {
                self.metrics.increment(metric_names::STORE_ERROR);
                warn!(error = %e, "failed to record search access");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRecordStore, StoreError};
    use async_trait::async_trait;

    fn record(id: &str, original: &str, translated: &str, timestamp: i64) -> TranslationRecord {
        TranslationRecord {
            id: id.into(),
            original_text: original.into(),
            translated_text: translated.into(),
            source_language_code: "en".into(),
            target_language_code: "zh".into(),
            source_language_name: "English".into(),
            target_language_name: "Chinese".into(),
            timestamp,
            last_access_time: timestamp,
            is_favorite: false,
            usage_count: 0,
            provider: "google".into(),
            tags: Vec::new(),
        }
    }

    async fn engine_with(records: Vec<TranslationRecord>) -> SearchEngine {
        let store = MemoryRecordStore::new();
        for r in &records {
            store.insert(r).await.unwrap();
        }
        SearchEngine::new(
            Arc::new(store),
            Arc::new(MetricsRegistry::new()),
            SearchConfig::default(),
        )
    }

    #[tokio::test]
    async fn blank_query_is_empty_regardless_of_contents() {
        let engine = engine_with(vec![record("a", "Hello", "你好", 1)]).await;
        assert_eq!(engine.search("").await, SearchState::Empty);
        assert_eq!(engine.search("   ").await, SearchState::Empty);
    }

    #[tokio::test]
    async fn no_candidates_is_no_results() {
        let engine = engine_with(vec![record("a", "Hello", "你好", 1)]).await;
        assert_eq!(
            engine.search("zebra").await,
            SearchState::NoResults {
                query: "zebra".into()
            }
        );
    }

    #[test]
    fn equal_scores_prefer_newer_records() {
        // Both records are past the recency window, so scores tie exactly.
        let now = 365 * crate::record::MILLIS_PER_DAY;
        let items = rank(
            vec![
                record("older", "Hello", "你好", 1_000),
                record("newer", "Hello", "你好", 2_000),
            ],
            "hello",
            now,
        );
        assert_eq!(items[0].score, items[1].score);
        assert_eq!(items[0].record.id, "newer");
        assert_eq!(items[1].record.id, "older");
    }

    #[tokio::test]
    async fn higher_relevance_ranks_first_and_highlights() {
        let now = now_millis();
        let engine = engine_with(vec![
            record("substring", "Say hello", "说你好", now + 10),
            record("exact", "hello", "你好", now),
        ])
        .await;
        match engine.search("Hello").await {
            SearchState::Success {
                query,
                items,
                total_count,
            } => {
                assert_eq!(query, "Hello");
                assert_eq!(total_count, 2);
                assert_eq!(items[0].record.id, "exact");
                assert_eq!(items[1].original_highlight, Some(HighlightSpan { start: 4, end: 9 }));
                assert_eq!(items[1].translated_highlight, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn results_are_truncated_but_counted() {
        let now = now_millis();
        let records = (0..60)
            .map(|i| record(&format!("r{i}"), "apple pie", "苹果派", now + i))
            .collect();
        let engine = engine_with(records).await;
        match engine.search("apple").await {
            SearchState::Success {
                items, total_count, ..
            } => {
                assert_eq!(items.len(), 50);
                assert_eq!(total_count, 60);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn insert(&self, _: &TranslationRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn insert_batch(&self, _: &[TranslationRecord]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn get_by_id(&self, _: &str) -> Result<Option<TranslationRecord>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn update_favorite(&self, _: &str, _: bool) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn favorite_within_limit(&self, _: &str, _: usize) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn update_tags(&self, _: &str, _: &[String]) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn record_access(&self, _: &str, _: i64, _: bool) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn touch(&self, _: &[String], _: i64) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn delete_by_id(&self, _: &str) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn delete_by_ids(&self, _: &[String]) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn delete_all(&self) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn delete_non_favorites(&self) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn delete_older_than(&self, _: i64, _: bool) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn query_all(&self) -> Result<Vec<TranslationRecord>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn query_favorites(&self) -> Result<Vec<TranslationRecord>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn query_substring_match(
            &self,
            _: &str,
        ) -> Result<Vec<TranslationRecord>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn query_time_range(
            &self,
            _: i64,
            _: i64,
        ) -> Result<Vec<TranslationRecord>, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn count(&self) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn favorite_count(&self) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_becomes_error_state() {
        let engine = SearchEngine::new(
            Arc::new(BrokenStore),
            Arc::new(MetricsRegistry::new()),
            SearchConfig::default(),
        );
        match engine.search("hello").await {
            SearchState::Error { query, message } => {
                assert_eq!(query, "hello");
                assert!(message.contains("disk gone"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
