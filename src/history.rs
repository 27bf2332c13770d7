//! History manager: validation, favorites and protected deletion on top of a
//! `RecordStore`.
//!
//! Validation and business-rule failures are decided locally before any store
//! access. Store failures pass through untouched; nothing here retries.
//! Every successful delete also drops the matching result-cache entries so a
//! deleted record is never served from the cache.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::record::{now_millis, NewTranslation, RecordId, TranslationRecord, MILLIS_PER_DAY};
use crate::store::{RecordStore, StoreError};
use crate::translate::cache::ResultCache;
use crate::translate::normalize::{is_language_code, normalize_language_code};

/// Sentinel the caller must pass to `clear_all`. It only guards against
/// accidental calls; it carries no secret.
pub const CLEAR_ALL_CONFIRMATION: &str = "CONFIRM_CLEAR_ALL_HISTORY";

/// Why a delete was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ProtectionReason {
    Favorite,
    HighUsage { usage_count: u32 },
}

impl ProtectionReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProtectionReason::Favorite => "favorite",
            ProtectionReason::HighUsage { .. } => "high_usage",
        }
    }
}

impl fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionReason::Favorite => write!(f, "record is a favorite"),
            ProtectionReason::HighUsage { usage_count } => {
                write!(f, "record has been used {usage_count} times")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("record {id} is protected ({reason}); retry with force to delete it")]
    Protected {
        id: RecordId,
        reason: ProtectionReason,
    },

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FavoriteOutcome {
    Favorited { id: RecordId },
    Unfavorited { id: RecordId },
    /// Nothing changed: the favorite ceiling is already reached.
    LimitExceeded { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub id: RecordId,
    /// True when a protection rule was overridden with `force`.
    pub forced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchDeleteOutcome {
    /// Distinct ids considered, after deduplication and the batch cap.
    pub total_requested: usize,
    pub deleted: usize,
    pub protected_count: usize,
    pub not_found: usize,
    /// Items that hit a store error.
    pub failed: usize,
    /// Distinct ids dropped because the batch exceeded the cap.
    pub truncated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub deleted_count: usize,
    pub kept_favorites: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub favorites: usize,
}

pub struct HistoryManager {
    store: Arc<dyn RecordStore>,
    cache: Arc<ResultCache>,
    config: HistoryConfig,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<ResultCache>, config: HistoryConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Validate, normalize and persist a new translation.
    pub async fn save(&self, candidate: NewTranslation) -> Result<TranslationRecord, HistoryError> {
        let record = self.build_record(candidate, now_millis())?;
        self.store.insert(&record).await?;
        info!(
            id = %record.id,
            source = %record.source_language_code,
            target = %record.target_language_code,
            provider = %record.provider,
            "translation saved"
        );
        Ok(record)
    }

    /// Validate every candidate first; persist all of them or none.
    pub async fn save_batch(
        &self,
        candidates: Vec<NewTranslation>,
    ) -> Result<Vec<TranslationRecord>, HistoryError> {
        let now = now_millis();
        let records = candidates
            .into_iter()
            .map(|c| self.build_record(c, now))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.insert_batch(&records).await?;
        info!(count = records.len(), "translation batch saved");
        Ok(records)
    }

    /// Pure read; does not count as usage.
    pub async fn get(&self, id: &str) -> Result<TranslationRecord, HistoryError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    /// Count one use of a record and return its fresh state.
    pub async fn record_usage(&self, id: &str) -> Result<TranslationRecord, HistoryError> {
        let affected = self.store.record_access(id, now_millis(), true).await?;
        if affected == 0 {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        let record = self.get(id).await?;
        self.cache.refresh_record(&record);
        debug!(id, usage_count = record.usage_count, "usage recorded");
        Ok(record)
    }

    /// Flip the favorite flag. Favoriting is refused with `LimitExceeded`
    /// once `favorite_limit` favorites exist; the ceiling check and the update
    /// are one store operation, so concurrent toggles cannot overshoot it.
    pub async fn toggle_favorite(&self, id: &str) -> Result<FavoriteOutcome, HistoryError> {
        let mut record = self.get(id).await?;
        let limit = self.config.favorite_limit;

        if record.is_favorite {
            if self.store.update_favorite(id, false).await? == 0 {
                return Err(HistoryError::NotFound(id.to_string()));
            }
            record.is_favorite = false;
            self.cache.refresh_record(&record);
            info!(id, favorite = false, "favorite toggled");
            return Ok(FavoriteOutcome::Unfavorited { id: record.id });
        }

        if self.store.favorite_within_limit(id, limit).await? == 0 {
            // Gone, favorited concurrently, or the ceiling was reached.
            let current = self.get(id).await?;
            if current.is_favorite {
                self.cache.refresh_record(&current);
                return Ok(FavoriteOutcome::Favorited { id: current.id });
            }
            warn!(id, limit, "favorite limit reached");
            return Ok(FavoriteOutcome::LimitExceeded { limit });
        }
        record.is_favorite = true;
        self.cache.refresh_record(&record);
        info!(id, favorite = true, "favorite toggled");
        Ok(FavoriteOutcome::Favorited { id: record.id })
    }

    /// Delete one record. Favorites and heavily used records are refused
    /// unless `force` is set.
    pub async fn delete(&self, id: &str, force: bool) -> Result<DeleteOutcome, HistoryError> {
        let record = self.get(id).await?;
        let protection = self.protection_reason(&record);

        if let Some(reason) = protection {
            if !force {
                debug!(id, reason = reason.code(), "delete refused");
                return Err(HistoryError::Protected {
                    id: record.id,
                    reason,
                });
            }
        }

        if self.store.delete_by_id(id).await? == 0 {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        self.cache.invalidate_record(id);

        let forced = protection.is_some();
        info!(id, forced, "translation deleted");
        Ok(DeleteOutcome {
            id: record.id,
            forced,
        })
    }

    /// Delete many records one by one. Individual failures are counted and
    /// never abort the batch, so the counts always reflect what happened even
    /// if the batch stops early.
    pub async fn delete_batch(&self, ids: &[String], force: bool) -> BatchDeleteOutcome {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();

        let limit = self.config.batch_limit;
        let truncated = unique.len().saturating_sub(limit);
        if truncated > 0 {
            warn!(requested = unique.len(), limit, "batch delete truncated");
        }

        let mut outcome = BatchDeleteOutcome {
            total_requested: unique.len().min(limit),
            truncated,
            ..Default::default()
        };

        for id in unique.into_iter().take(limit) {
            match self.delete(id, force).await {
                Ok(_) => outcome.deleted += 1,
                Err(HistoryError::Protected { .. }) => outcome.protected_count += 1,
                Err(HistoryError::NotFound(_)) => outcome.not_found += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "batch delete item failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            total = outcome.total_requested,
            deleted = outcome.deleted,
            protected = outcome.protected_count,
            not_found = outcome.not_found,
            failed = outcome.failed,
            "batch delete finished"
        );
        outcome
    }

    /// Remove all history, or only non-favorites. Requires the exact
    /// `CLEAR_ALL_CONFIRMATION` token.
    pub async fn clear_all(
        &self,
        keep_favorites: bool,
        confirmation_token: &str,
    ) -> Result<ClearOutcome, HistoryError> {
        if confirmation_token != CLEAR_ALL_CONFIRMATION {
            return Err(HistoryError::Validation(
                "clear-all confirmation token does not match".to_string(),
            ));
        }

        let deleted_count = if keep_favorites {
            self.store.delete_non_favorites().await?
        } else {
            self.store.delete_all().await?
        };
        self.cache.clear();

        info!(deleted_count, keep_favorites, "history cleared");
        Ok(ClearOutcome {
            deleted_count,
            kept_favorites: keep_favorites,
        })
    }

    /// Replace a record's tags. Tags are trimmed; blanks and repeats dropped.
    pub async fn set_tags(
        &self,
        id: &str,
        tags: Vec<String>,
    ) -> Result<TranslationRecord, HistoryError> {
        let tags = normalize_tags(tags);
        if self.store.update_tags(id, &tags).await? == 0 {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        let record = self.get(id).await?;
        self.cache.refresh_record(&record);
        Ok(record)
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<TranslationRecord, HistoryError> {
        let record = self.get(id).await?;
        let mut tags = record.tags;
        tags.push(tag.to_string());
        self.set_tags(id, tags).await
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<TranslationRecord, HistoryError> {
        let record = self.get(id).await?;
        let tag = tag.trim();
        let tags = record.tags.into_iter().filter(|t| t != tag).collect();
        self.set_tags(id, tags).await
    }

    /// Newest records first, at most `limit`.
    pub async fn recent(&self, limit: usize) -> Result<Vec<TranslationRecord>, HistoryError> {
        let mut records = self.store.query_all().await?;
        records.truncate(limit);
        Ok(records)
    }

    pub async fn favorites(&self) -> Result<Vec<TranslationRecord>, HistoryError> {
        Ok(self.store.query_favorites().await?)
    }

    /// Records created within `[start_ms, end_ms]`, newest first.
    pub async fn between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TranslationRecord>, HistoryError> {
        if start_ms > end_ms {
            return Err(HistoryError::Validation(format!(
                "time range start {start_ms} is after end {end_ms}"
            )));
        }
        Ok(self.store.query_time_range(start_ms, end_ms).await?)
    }

    /// Retention cleanup: delete records older than `days`.
    pub async fn purge_older_than(
        &self,
        days: u32,
        keep_favorites: bool,
    ) -> Result<usize, HistoryError> {
        let cutoff = now_millis() - i64::from(days) * MILLIS_PER_DAY;
        let removed = self.store.delete_older_than(cutoff, keep_favorites).await?;
        if removed > 0 {
            self.cache.clear();
            info!(removed, days, keep_favorites, "history retention cleanup");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        Ok(HistoryStats {
            total: self.store.count().await?,
            favorites: self.store.favorite_count().await?,
        })
    }

    fn protection_reason(&self, record: &TranslationRecord) -> Option<ProtectionReason> {
        if record.is_favorite {
            Some(ProtectionReason::Favorite)
        } else if record.usage_count > self.config.protected_usage_threshold {
            Some(ProtectionReason::HighUsage {
                usage_count: record.usage_count,
            })
        } else {
            None
        }
    }

    fn build_record(
        &self,
        candidate: NewTranslation,
        now: i64,
    ) -> Result<TranslationRecord, HistoryError> {
        let original_text = candidate.original_text.trim().to_string();
        let translated_text = candidate.translated_text.trim().to_string();
        self.validate_text("original text", &original_text)?;
        self.validate_text("translated text", &translated_text)?;

        let (source_code, target_code) = self.validate_language_pair(
            &candidate.source_language_code,
            &candidate.target_language_code,
        )?;

        let source_name = candidate.source_language_name.trim().to_string();
        let target_name = candidate.target_language_name.trim().to_string();
        require_non_blank("source language name", &source_name)?;
        require_non_blank("target language name", &target_name)?;

        let provider = candidate.provider.trim().to_lowercase();
        require_non_blank("provider", &provider)?;
        if !self.config.allowed_providers.iter().any(|p| *p == provider) {
            return Err(HistoryError::Validation(format!(
                "unsupported provider: {provider}"
            )));
        }

        if original_text == translated_text
            && original_text.chars().count() > self.config.identical_text_min_chars
        {
            return Err(HistoryError::BusinessRule(
                "translation is identical to the original text".to_string(),
            ));
        }

        Ok(TranslationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            original_text,
            translated_text,
            source_language_code: source_code,
            target_language_code: target_code,
            source_language_name: source_name,
            target_language_name: target_name,
            timestamp: now,
            last_access_time: now,
            is_favorite: false,
            usage_count: 0,
            provider,
            tags: normalize_tags(candidate.tags),
        })
    }

    /// Non-blank and within the character bound.
    pub(crate) fn validate_text(&self, field: &str, text: &str) -> Result<(), HistoryError> {
        require_non_blank(field, text)?;
        let chars = text.chars().count();
        if chars > self.config.max_text_chars {
            return Err(HistoryError::Validation(format!(
                "{field} is {chars} characters, limit is {}",
                self.config.max_text_chars
            )));
        }
        Ok(())
    }

    /// Normalize both codes and check they form a usable direction.
    pub(crate) fn validate_language_pair(
        &self,
        source: &str,
        target: &str,
    ) -> Result<(String, String), HistoryError> {
        let source = normalize_language_code(source);
        let target = normalize_language_code(target);
        require_non_blank("source language code", &source)?;
        require_non_blank("target language code", &target)?;
        for code in [&source, &target] {
            if !is_language_code(code) {
                return Err(HistoryError::Validation(format!(
                    "malformed language code: {code}"
                )));
            }
        }
        if source == target {
            return Err(HistoryError::BusinessRule(format!(
                "source and target language are both {source}"
            )));
        }
        Ok((source, target))
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), HistoryError> {
    if value.trim().is_empty() {
        return Err(HistoryError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
