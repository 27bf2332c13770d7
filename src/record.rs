//! Translation history record and the save candidate that produces it.

use serde::{Deserialize, Serialize};

/// Opaque record identifier (uuid v4 string).
pub type RecordId = String;

/// A persisted translation, the unit of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub id: RecordId,
    pub original_text: String,
    pub translated_text: String,
    pub source_language_code: String,
    pub target_language_code: String,
    pub source_language_name: String,
    pub target_language_name: String,
    /// Creation time, Unix millis. Never changes after save.
    pub timestamp: i64,
    /// Last read or search match, Unix millis. Always >= `timestamp`.
    pub last_access_time: i64,
    pub is_favorite: bool,
    pub usage_count: u32,
    /// Backend that produced the translation ("google", "baidu", ...).
    pub provider: String,
    pub tags: Vec<String>,
}

impl TranslationRecord {
    /// Whole days elapsed between creation and `now_ms` (fractional).
    pub fn days_since_creation(&self, now_ms: i64) -> f64 {
        let elapsed = (now_ms - self.timestamp).max(0);
        elapsed as f64 / MILLIS_PER_DAY as f64
    }
}

/// Input to `HistoryManager::save`. Fields the manager stamps itself
/// (id, timestamps, counters, favorite flag) are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTranslation {
    pub original_text: String,
    pub translated_text: String,
    pub source_language_code: String,
    pub target_language_code: String,
    pub source_language_name: String,
    pub target_language_name: String,
    pub provider: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub(crate) const MILLIS_PER_DAY: i64 = 86_400_000;

/// Current time as Unix timestamp (milliseconds).
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
