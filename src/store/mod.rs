//! Record store adapter: the seam between the history core and durable storage.
//!
//! `SqliteRecordStore` is the durable backend and bounds every call with an
//! operation timeout. `MemoryRecordStore` backs ephemeral sessions; its calls
//! never block beyond a short in-process lock.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::TranslationRecord;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Failure of the underlying persistence layer. Propagated verbatim by the
/// history manager; this crate never retries store calls.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open record store: {0}")]
    Open(String),

    #[error("sqlite error during {op}: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store operation {op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("store worker failed during {op}: {message}")]
    Worker { op: &'static str, message: String },

    #[error("duplicate record id: {0}")]
    Duplicate(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Durable record storage. Mutations return the number of affected rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &TranslationRecord) -> Result<(), StoreError>;

    /// Insert all records or none.
    async fn insert_batch(&self, records: &[TranslationRecord]) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<TranslationRecord>, StoreError>;

    async fn update_favorite(&self, id: &str, favorite: bool) -> Result<usize, StoreError>;

    /// Mark a non-favorite record as favorite only while fewer than `limit`
    /// favorites exist. Check and update happen as one step. Returns 0 when
    /// the record is missing, already a favorite, or the ceiling is reached.
    async fn favorite_within_limit(&self, id: &str, limit: usize) -> Result<usize, StoreError>;

    async fn update_tags(&self, id: &str, tags: &[String]) -> Result<usize, StoreError>;

    /// Set `last_access_time` to `max(now_ms, timestamp)` and, when
    /// `increment_usage`, bump `usage_count` by one.
    async fn record_access(
        &self,
        id: &str,
        now_ms: i64,
        increment_usage: bool,
    ) -> Result<usize, StoreError>;

    /// Bump `last_access_time` for a set of records without counting usage.
    async fn touch(&self, ids: &[String], now_ms: i64) -> Result<usize, StoreError>;

    async fn delete_by_id(&self, id: &str) -> Result<usize, StoreError>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError>;

    async fn delete_all(&self) -> Result<usize, StoreError>;

    async fn delete_non_favorites(&self) -> Result<usize, StoreError>;

    /// Delete records created strictly before `cutoff_ms`.
    async fn delete_older_than(
        &self,
        cutoff_ms: i64,
        keep_favorites: bool,
    ) -> Result<usize, StoreError>;

    /// All records, newest first.
    async fn query_all(&self) -> Result<Vec<TranslationRecord>, StoreError>;

    /// Favorite records, newest first.
    async fn query_favorites(&self) -> Result<Vec<TranslationRecord>, StoreError>;

    /// Case-insensitive substring match on original OR translated text,
    /// newest first.
    async fn query_substring_match(
        &self,
        keyword: &str,
    ) -> Result<Vec<TranslationRecord>, StoreError>;

    /// Records with `start_ms <= timestamp <= end_ms`, newest first.
    async fn query_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TranslationRecord>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn favorite_count(&self) -> Result<usize, StoreError>;
}
