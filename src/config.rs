//! Runtime configuration, loaded from TOML. Every section falls back to its
//! defaults, so an empty file is a valid configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub search: SearchConfig,
    pub store: StoreConfig,
    pub translate: TranslateConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached results.
    pub capacity: usize,
    /// Entry lifetime in seconds, measured from insertion.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 24 * 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Upper bound, in characters, for original and translated text.
    pub max_text_chars: usize,
    /// Identical original/translated text longer than this is rejected.
    pub identical_text_min_chars: usize,
    pub favorite_limit: usize,
    /// Records used more than this many times are protected from deletion.
    pub protected_usage_threshold: u32,
    pub batch_limit: usize,
    pub allowed_providers: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 5000,
            identical_text_min_chars: 10,
            favorite_limit: 1000,
            protected_usage_threshold: 10,
            batch_limit: 100,
            allowed_providers: ["baidu", "google", "youdao", "tencent"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    /// Ranked items returned per query; `total_count` still reports all.
    pub max_results: usize,
    /// Bump `last_access_time` on records that matched a search.
    pub touch_matches: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_results: 50,
            touch_matches: true,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("translation_history.db"),
            op_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Upper bound on one remote translate call.
    pub timeout_ms: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

impl TranslateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "translation_history=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity", "must be greater than zero"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", "must be greater than zero"));
        }
        if self.history.max_text_chars == 0 {
            return Err(invalid("history.max_text_chars", "must be greater than zero"));
        }
        if self.history.batch_limit == 0 {
            return Err(invalid("history.batch_limit", "must be greater than zero"));
        }
        if self.history.allowed_providers.is_empty() {
            return Err(invalid("history.allowed_providers", "must not be empty"));
        }
        if self.store.op_timeout_ms == 0 {
            return Err(invalid("store.op_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    /// Cache capacity as the non-zero size the cache needs.
    pub fn cache_capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.cache.capacity)
            .ok_or_else(|| invalid("cache.capacity", "must be greater than zero"))
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}
