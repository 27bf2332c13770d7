//! Translation history: a result cache in front of a remote translator,
//! persistent history with favorites and protected deletion, and a live
//! ranked search over past translations.
//!
//! `AppContext` wires the pieces together over one shared store and cache.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod record;
pub mod search;
pub mod store;
pub mod translate;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use config::Config;
pub use error::{Error, ErrorKind};
pub use history::{HistoryError, HistoryManager, CLEAR_ALL_CONFIRMATION};
pub use record::{NewTranslation, RecordId, TranslationRecord};
pub use search::{RankedItem, SearchEngine, SearchState};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore, StoreError};
pub use translate::{TranslateError, TranslationService, Translator};

use config::LoggingConfig;
use metrics::{MetricsRegistry, MetricsSnapshot};
use translate::cache::ResultCache;

/// Shared application state. Cheap to clone pieces out of; every component
/// sees the same store, cache and metrics.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<ResultCache>,
    pub metrics: Arc<MetricsRegistry>,
    pub history: Arc<HistoryManager>,
    pub search: Arc<SearchEngine>,
    pub translation: Arc<TranslationService>,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        translator: Arc<dyn Translator>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let cache = Arc::new(ResultCache::new(config.cache_capacity()?, config.cache.ttl()));
        let history = Arc::new(HistoryManager::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.history.clone(),
        ));
        let search = Arc::new(SearchEngine::new(
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.search.clone(),
        ));
        let translation = Arc::new(TranslationService::new(
            translator,
            Arc::clone(&cache),
            Arc::clone(&history),
            Arc::clone(&metrics),
            config.translate.timeout(),
        ));

        info!(
            cache_capacity = config.cache.capacity,
            cache_ttl_secs = config.cache.ttl_secs,
            "translation history ready"
        );

        Ok(Self {
            config,
            store,
            cache,
            metrics,
            history,
            search,
            translation,
        })
    }

    /// SQLite-backed context at `config.store.database_path`.
    pub fn open(config: Config, translator: Arc<dyn Translator>) -> Result<Self, Error> {
        let store = SqliteRecordStore::open(&config.store.database_path, config.store.op_timeout())?;
        Self::new(config, Arc::new(store), translator)
    }

    /// Context over a volatile in-process store.
    pub fn in_memory(config: Config, translator: Arc<dyn Translator>) -> Result<Self, Error> {
        Self::new(config, Arc::new(MemoryRecordStore::new()), translator)
    }

    /// Start a live search session: send raw keystroke queries, receive
    /// debounced, latest-only results.
    pub fn search_session(&self) -> (mpsc::Sender<String>, mpsc::Receiver<SearchState>) {
        search::pipeline::session(Arc::clone(&self.search))
    }

    pub fn metrics_summary(&self) -> MetricsSnapshot {
        self.metrics.summary()
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured
/// filter. Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_ok() {
        info!(json = logging.json, "tracing initialized");
    }
}
