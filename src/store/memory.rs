//! In-process record store for ephemeral sessions (nothing touches disk).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{RecordStore, StoreError};
use crate::record::TranslationRecord;

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, TranslationRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<TranslationRecord>
    where
        F: Fn(&TranslationRecord) -> bool,
    {
        let records = self.records.read();
        let mut out: Vec<TranslationRecord> =
            records.values().filter(|r| filter(r)).cloned().collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    fn remove_where<F>(&self, filter: F) -> usize
    where
        F: Fn(&TranslationRecord) -> bool,
    {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !filter(r));
        before - records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &TranslationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn insert_batch(&self, batch: &[TranslationRecord]) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let mut seen = std::collections::HashSet::new();
        for record in batch {
            if records.contains_key(&record.id) || !seen.insert(record.id.as_str()) {
                return Err(StoreError::Duplicate(record.id.clone()));
            }
        }
        for record in batch {
            records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<TranslationRecord>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn update_favorite(&self, id: &str, favorite: bool) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        Ok(match records.get_mut(id) {
            Some(record) => {
                record.is_favorite = favorite;
                1
            }
            None => 0,
        })
    }

    async fn favorite_within_limit(&self, id: &str, limit: usize) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        let favorites = records.values().filter(|r| r.is_favorite).count();
        if favorites >= limit {
            return Ok(0);
        }
        Ok(match records.get_mut(id) {
            Some(record) if !record.is_favorite => {
                record.is_favorite = true;
                1
            }
            _ => 0,
        })
    }

    async fn update_tags(&self, id: &str, tags: &[String]) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        Ok(match records.get_mut(id) {
            Some(record) => {
                record.tags = tags.to_vec();
                1
            }
            None => 0,
        })
    }

    async fn record_access(
        &self,
        id: &str,
        now_ms: i64,
        increment_usage: bool,
    ) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        Ok(match records.get_mut(id) {
            Some(record) => {
                record.last_access_time = now_ms.max(record.timestamp);
                if increment_usage {
                    record.usage_count = record.usage_count.saturating_add(1);
                }
                1
            }
            None => 0,
        })
    }

    async fn touch(&self, ids: &[String], now_ms: i64) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        let mut affected = 0;
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                record.last_access_time = now_ms.max(record.timestamp);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_by_id(&self, id: &str) -> Result<usize, StoreError> {
        Ok(self.records.write().remove(id).map_or(0, |_| 1))
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        Ok(ids.iter().filter(|id| records.remove(id.as_str()).is_some()).count())
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        Ok(self.remove_where(|_| true))
    }

    async fn delete_non_favorites(&self) -> Result<usize, StoreError> {
        Ok(self.remove_where(|r| !r.is_favorite))
    }

    async fn delete_older_than(
        &self,
        cutoff_ms: i64,
        keep_favorites: bool,
    ) -> Result<usize, StoreError> {
        Ok(self.remove_where(|r| r.timestamp < cutoff_ms && !(keep_favorites && r.is_favorite)))
    }

    async fn query_all(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        Ok(self.collect_sorted(|_| true))
    }

    async fn query_favorites(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        Ok(self.collect_sorted(|r| r.is_favorite))
    }

    async fn query_substring_match(
        &self,
        keyword: &str,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        let needle = keyword.to_lowercase();
        Ok(self.collect_sorted(|r| {
            r.original_text.to_lowercase().contains(&needle)
                || r.translated_text.to_lowercase().contains(&needle)
        }))
    }

    async fn query_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        Ok(self.collect_sorted(|r| r.timestamp >= start_ms && r.timestamp <= end_ms))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().len())
    }

    async fn favorite_count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().values().filter(|r| r.is_favorite).count())
    }
}
