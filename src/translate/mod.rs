//! Cached translation: result cache in front of a remote translator, with
//! every fresh translation persisted to history.

pub mod cache;
pub mod normalize;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::history::{HistoryError, HistoryManager};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::record::{NewTranslation, TranslationRecord};
use cache::{CacheKey, ResultCache};
use normalize::{language_name, normalize_input};

/// Remote translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Provider name stored on every record this backend produces.
    fn provider(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, TranslateError>;
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("API error: {0}")]
    Api(String),

    #[error("translation timeout after {0:?}")]
    Timeout(Duration),

    #[error("translator returned an empty result")]
    EmptyResult,
}

pub struct TranslationService {
    translator: Arc<dyn Translator>,
    cache: Arc<ResultCache>,
    history: Arc<HistoryManager>,
    metrics: Arc<MetricsRegistry>,
    timeout: Duration,
}

impl TranslationService {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<ResultCache>,
        history: Arc<HistoryManager>,
        metrics: Arc<MetricsRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            translator,
            cache,
            history,
            metrics,
            timeout,
        }
    }

    /// Serve from cache when possible; otherwise translate remotely, persist
    /// the result and cache it. A failed translation leaves the cache alone.
    pub async fn cached_or_translate(
        &self,
        input: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslationRecord, Error> {
        let text = normalize_input(input);
        self.history.validate_text("input text", &text)?;
        let (source, target) = self.history.validate_language_pair(source_lang, target_lang)?;
        let key = CacheKey::new(&source, &target, &text);

        if let Some(entry) = self.cache.get(&key) {
            match self.history.record_usage(&entry.record.id).await {
                Ok(record) => {
                    self.metrics.increment(metric_names::CACHE_HIT);
                    debug!(id = %record.id, "translation cache hit");
                    return Ok(record);
                }
                Err(HistoryError::NotFound(id)) => {
                    // Deleted behind the cache's back; translate afresh.
                    debug!(id = %id, "cached record no longer stored");
                    self.cache.invalidate_record(&id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.metrics.increment(metric_names::CACHE_MISS);

        let span = self.metrics.span(metric_names::TRANSLATE_DONE);
        let translated = match tokio::time::timeout(
            self.timeout,
            self.translator.translate(&text, &source, &target),
        )
        .await
        {
            Ok(Ok(translated)) => translated,
            Ok(Err(e)) => {
                self.metrics.increment(metric_names::TRANSLATE_FAILED);
                warn!(error = %e, provider = self.translator.provider(), "translation failed");
                return Err(e.into());
            }
            Err(_) => {
                self.metrics.increment(metric_names::TRANSLATE_FAILED);
                warn!(timeout_ms = self.timeout.as_millis() as u64, "translation timed out");
                return Err(TranslateError::Timeout(self.timeout).into());
            }
        };
        let elapsed_us = span.finish();

        if translated.trim().is_empty() {
            self.metrics.increment(metric_names::TRANSLATE_FAILED);
            return Err(TranslateError::EmptyResult.into());
        }

        let record = self
            .history
            .save(NewTranslation {
                original_text: text,
                translated_text: translated,
                source_language_name: language_name(&source),
                target_language_name: language_name(&target),
                source_language_code: source,
                target_language_code: target,
                provider: self.translator.provider().to_string(),
                tags: Vec::new(),
            })
            .await?;

        self.cache.put(key, record.clone());
        info!(
            id = %record.id,
            provider = %record.provider,
            elapsed_ms = elapsed_us / 1000.0,
            "translation cached"
        );
        Ok(record)
    }
}
