//! SQLite-backed record store.
//! Every statement runs on the blocking pool behind a single connection
//! mutex and is bounded by the configured operation timeout.
//!
//! A timeout is only reported for a statement that never started. Once a
//! statement holds the connection it runs to completion and its real outcome
//! is returned, so a caller told "timed out" can rely on nothing having
//! been written.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::{RecordStore, StoreError};
use crate::record::TranslationRecord;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS translation_history (
        id TEXT PRIMARY KEY,
        original_text TEXT NOT NULL,
        translated_text TEXT NOT NULL,
        source_language_code TEXT NOT NULL,
        target_language_code TEXT NOT NULL,
        source_language_name TEXT NOT NULL,
        target_language_name TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        last_access_time INTEGER NOT NULL,
        is_favorite INTEGER NOT NULL DEFAULT 0,
        usage_count INTEGER NOT NULL DEFAULT 0,
        provider TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]'
    );
    CREATE INDEX IF NOT EXISTS idx_history_timestamp
        ON translation_history(timestamp);
    CREATE INDEX IF NOT EXISTS idx_history_favorite
        ON translation_history(is_favorite);";

/// Unicode-aware lowercase, registered on every connection so substring
/// matching folds case the same way as the in-memory store.
const FOLD_FN: &str = "unicode_lower";

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const ABANDONED: u8 = 2;

const SELECT_COLUMNS: &str = "SELECT id, original_text, translated_text,
        source_language_code, target_language_code,
        source_language_name, target_language_name,
        timestamp, last_access_time, is_favorite, usage_count, provider, tags
     FROM translation_history";

const INSERT_SQL: &str = "INSERT INTO translation_history
        (id, original_text, translated_text,
         source_language_code, target_language_code,
         source_language_name, target_language_name,
         timestamp, last_access_time, is_favorite, usage_count, provider, tags)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

/// Durable record store over a single SQLite connection.
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    op_timeout: Duration,
}

impl SqliteRecordStore {
    /// Open (or create) the history database at `db_path`.
    pub fn open(db_path: &Path, op_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)
            .map_err(|e| StoreError::Open(format!("{}: {e}", db_path.display())))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::Open(format!("PRAGMA failed: {e}")))?;

        let store = Self::with_connection(conn, op_timeout)?;
        info!(path = %db_path.display(), "history store opened");
        Ok(store)
    }

    /// Private in-memory database; contents vanish with the store.
    pub fn open_in_memory(op_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Open(format!("in-memory database: {e}")))?;
        Self::with_connection(conn, op_timeout)
    }

    fn with_connection(conn: Connection, op_timeout: Duration) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Open(format!("create history table failed: {e}")))?;
        conn.create_scalar_function(
            FOLD_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
        )
        .map_err(|e| StoreError::Open(format!("register {FOLD_FN} failed: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        })
    }

    /// Run `f` against the connection on the blocking pool, bounded by the
    /// operation timeout.
    ///
    /// The worker and the caller race for the same claim: the worker flips
    /// it to RUNNING once it holds the connection, the caller flips it to
    /// ABANDONED when the deadline passes. Whoever loses backs off, so a
    /// statement never runs after its caller has been told it timed out.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let claim = Arc::new(AtomicU8::new(PENDING));
        let worker_claim = Arc::clone(&claim);
        let lock_wait = self.op_timeout;

        let mut task = tokio::task::spawn_blocking(move || {
            let guard = conn.try_lock_for(lock_wait)?;
            worker_claim
                .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                .ok()?;
            Some(f(&guard))
        });

        let joined = match tokio::time::timeout(self.op_timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                let abandoned = claim
                    .compare_exchange(PENDING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok();
                if abandoned {
                    return Err(self.timed_out(op));
                }
                debug!(op, "statement already running past deadline, awaiting it");
                task.await
            }
        };

        match joined {
            Ok(Some(Ok(value))) => Ok(value),
            Ok(Some(Err(source))) => {
                warn!(op, error = %source, "store operation failed");
                Err(map_sqlite_error(op, source))
            }
            // The worker never got the connection or lost the claim.
            Ok(None) => Err(self.timed_out(op)),
            Err(join) => Err(StoreError::Worker {
                op,
                message: join.to_string(),
            }),
        }
    }

    fn timed_out(&self, op: &'static str) -> StoreError {
        warn!(op, timeout_ms = self.op_timeout.as_millis() as u64, "store operation timed out");
        StoreError::Timeout {
            op,
            after: self.op_timeout,
        }
    }

    async fn query_records(
        &self,
        op: &'static str,
        sql: String,
        args: Vec<rusqlite::types::Value>,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        self.run(op, move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), map_row)?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}

fn map_sqlite_error(op: &'static str, source: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, ref msg) = source {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return StoreError::Duplicate(msg.clone().unwrap_or_default());
        }
    }
    StoreError::Sqlite { op, source }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<TranslationRecord> {
    let tags_json: String = row.get(12)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TranslationRecord {
        id: row.get(0)?,
        original_text: row.get(1)?,
        translated_text: row.get(2)?,
        source_language_code: row.get(3)?,
        target_language_code: row.get(4)?,
        source_language_name: row.get(5)?,
        target_language_name: row.get(6)?,
        timestamp: row.get(7)?,
        last_access_time: row.get(8)?,
        is_favorite: row.get::<_, i32>(9)? != 0,
        usage_count: row.get(10)?,
        provider: row.get(11)?,
        tags,
    })
}

fn tags_to_json(tags: &[String]) -> rusqlite::Result<String> {
    serde_json::to_string(tags).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn insert_record(conn: &Connection, record: &TranslationRecord) -> rusqlite::Result<()> {
    let tags = tags_to_json(&record.tags)?;
    let mut stmt = conn.prepare_cached(INSERT_SQL)?;
    stmt.execute(params![
        record.id,
        record.original_text,
        record.translated_text,
        record.source_language_code,
        record.target_language_code,
        record.source_language_name,
        record.target_language_name,
        record.timestamp,
        record.last_access_time,
        record.is_favorite as i32,
        record.usage_count,
        record.provider,
        tags,
    ])?;
    Ok(())
}

/// `?1, ?2, ...` placeholder list for an IN clause.
fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &TranslationRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.run("insert", move |conn| insert_record(conn, &record))
            .await?;
        debug!("history record inserted");
        Ok(())
    }

    async fn insert_batch(&self, records: &[TranslationRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let records = records.to_vec();
        let count = records.len();
        self.run("insert_batch", move |conn| {
            let tx = conn.unchecked_transaction()?;
            for record in &records {
                insert_record(&tx, record)?;
            }
            tx.commit()
        })
        .await?;
        debug!(count, "history batch inserted");
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<TranslationRecord>, StoreError> {
        let id = id.to_string();
        self.run("get_by_id", move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                map_row,
            )
            .optional()
        })
        .await
    }

    async fn update_favorite(&self, id: &str, favorite: bool) -> Result<usize, StoreError> {
        let id = id.to_string();
        self.run("update_favorite", move |conn| {
            conn.execute(
                "UPDATE translation_history SET is_favorite = ?2 WHERE id = ?1",
                params![id, favorite as i32],
            )
        })
        .await
    }

    async fn favorite_within_limit(&self, id: &str, limit: usize) -> Result<usize, StoreError> {
        let id = id.to_string();
        let limit = limit as i64;
        self.run("favorite_within_limit", move |conn| {
            conn.execute(
                "UPDATE translation_history SET is_favorite = 1
                 WHERE id = ?1 AND is_favorite = 0
                   AND (SELECT COUNT(*) FROM translation_history WHERE is_favorite = 1) < ?2",
                params![id, limit],
            )
        })
        .await
    }

    async fn update_tags(&self, id: &str, tags: &[String]) -> Result<usize, StoreError> {
        let id = id.to_string();
        let tags = tags.to_vec();
        self.run("update_tags", move |conn| {
            let json = tags_to_json(&tags)?;
            conn.execute(
                "UPDATE translation_history SET tags = ?2 WHERE id = ?1",
                params![id, json],
            )
        })
        .await
    }

    async fn record_access(
        &self,
        id: &str,
        now_ms: i64,
        increment_usage: bool,
    ) -> Result<usize, StoreError> {
        let id = id.to_string();
        self.run("record_access", move |conn| {
            conn.execute(
                "UPDATE translation_history
                 SET last_access_time = MAX(?2, timestamp),
                     usage_count = usage_count + ?3
                 WHERE id = ?1",
                params![id, now_ms, increment_usage as i64],
            )
        })
        .await
    }

    async fn touch(&self, ids: &[String], now_ms: i64) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.run("touch", move |conn| {
            let tx = conn.unchecked_transaction()?;
            let mut affected = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "UPDATE translation_history
                     SET last_access_time = MAX(?2, timestamp)
                     WHERE id = ?1",
                )?;
                for id in &ids {
                    affected += stmt.execute(params![id, now_ms])?;
                }
            }
            tx.commit()?;
            Ok(affected)
        })
        .await
    }

    async fn delete_by_id(&self, id: &str) -> Result<usize, StoreError> {
        let id = id.to_string();
        self.run("delete_by_id", move |conn| {
            conn.execute("DELETE FROM translation_history WHERE id = ?1", params![id])
        })
        .await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.run("delete_by_ids", move |conn| {
            let sql = format!(
                "DELETE FROM translation_history WHERE id IN ({})",
                placeholders(ids.len())
            );
            conn.execute(&sql, params_from_iter(ids.iter()))
        })
        .await
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self
            .run("delete_all", |conn| {
                conn.execute("DELETE FROM translation_history", [])
            })
            .await?;
        info!(removed, "history cleared");
        Ok(removed)
    }

    async fn delete_non_favorites(&self) -> Result<usize, StoreError> {
        let removed = self
            .run("delete_non_favorites", |conn| {
                conn.execute("DELETE FROM translation_history WHERE is_favorite = 0", [])
            })
            .await?;
        info!(removed, "non-favorite history cleared");
        Ok(removed)
    }

    async fn delete_older_than(
        &self,
        cutoff_ms: i64,
        keep_favorites: bool,
    ) -> Result<usize, StoreError> {
        let removed = self
            .run("delete_older_than", move |conn| {
                let sql = if keep_favorites {
                    "DELETE FROM translation_history WHERE timestamp < ?1 AND is_favorite = 0"
                } else {
                    "DELETE FROM translation_history WHERE timestamp < ?1"
                };
                conn.execute(sql, params![cutoff_ms])
            })
            .await?;
        if removed > 0 {
            info!(removed, cutoff_ms, keep_favorites, "history cleanup");
        }
        Ok(removed)
    }

    async fn query_all(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        self.query_records(
            "query_all",
            format!("{SELECT_COLUMNS} ORDER BY timestamp DESC"),
            Vec::new(),
        )
        .await
    }

    async fn query_favorites(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        self.query_records(
            "query_favorites",
            format!("{SELECT_COLUMNS} WHERE is_favorite = 1 ORDER BY timestamp DESC"),
            Vec::new(),
        )
        .await
    }

    async fn query_substring_match(
        &self,
        keyword: &str,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        let needle = keyword.to_lowercase();
        self.query_records(
            "query_substring_match",
            format!(
                "{SELECT_COLUMNS}
                 WHERE instr({FOLD_FN}(original_text), ?1) > 0
                    OR instr({FOLD_FN}(translated_text), ?1) > 0
                 ORDER BY timestamp DESC"
            ),
            vec![rusqlite::types::Value::Text(needle)],
        )
        .await
    }

    async fn query_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        self.query_records(
            "query_time_range",
            format!(
                "{SELECT_COLUMNS} WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp DESC"
            ),
            vec![
                rusqlite::types::Value::Integer(start_ms),
                rusqlite::types::Value::Integer(end_ms),
            ],
        )
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.run("count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM translation_history", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .await
        .map(|n| n as usize)
    }

    async fn favorite_count(&self) -> Result<usize, StoreError> {
        self.run("favorite_count", |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM translation_history WHERE is_favorite = 1",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map(|n| n as usize)
    }
}
