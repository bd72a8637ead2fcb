//! SQLite-backed queue store.
//!
//! The queue is stored one row per action, keyed by its position in queue
//! order, and rewritten inside a single transaction on every save. The sync
//! status lives in a single-row table. All SQLite calls run on the blocking
//! pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use checksync_core::{LoadedQueue, QueueStore};
use checksync_domain::{ChecksyncError, QueuedAction, Result, SyncStatusRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::task;
use tracing::{info, warn};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// [`QueueStore`] backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueueStore").finish_non_exhaustive()
    }
}

impl SqliteQueueStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(InfraError::from)?;
        }
        let conn = Connection::open(path).map_err(map_sql_error)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(map_sql_error)?;
        conn.pragma_update(None, "synchronous", "FULL").map_err(map_sql_error)?;

        info!(db_path = %path.display(), "sqlite queue store opened");
        Self::with_connection(conn)
    }

    /// In-memory database, for tests and ephemeral engines.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(map_sql_error)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        create_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || op(&mut *conn.lock())).await.map_err(map_join_error)?
    }

    /// Run raw SQL against the database. Used by tests to simulate damage.
    #[doc(hidden)]
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_owned();
        self.with_conn(move |conn| conn.execute_batch(&sql).map_err(map_sql_error)).await
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn load_queue(&self) -> Result<LoadedQueue> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT position, record FROM queued_actions ORDER BY position")
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                .map_err(map_sql_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_sql_error)?;

            let records: Vec<Value> = rows
                .into_iter()
                .map(|(position, raw)| match serde_json::from_str(&raw) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(position, error = %err, "Queue row is not valid JSON");
                        Value::String(raw)
                    }
                })
                .collect();
            Ok(LoadedQueue::from(records))
        })
        .await
    }

    async fn save_queue(&self, actions: &[QueuedAction]) -> Result<()> {
        let rows = actions
            .iter()
            .map(|action| Ok((action.id.to_string(), serde_json::to_string(action)?)))
            .collect::<std::result::Result<Vec<_>, serde_json::Error>>()
            .map_err(InfraError::from)?;

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            tx.execute("DELETE FROM queued_actions", []).map_err(map_sql_error)?;
            {
                let mut insert = tx
                    .prepare("INSERT INTO queued_actions (position, id, record) VALUES (?1, ?2, ?3)")
                    .map_err(map_sql_error)?;
                for (position, (id, record)) in rows.iter().enumerate() {
                    let position = i64::try_from(position).unwrap_or(i64::MAX);
                    insert.execute(params![position, id, record]).map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)
        })
        .await
    }

    async fn load_sync_status(&self) -> Result<Option<SyncStatusRecord>> {
        let raw = self
            .with_conn(|conn| {
                conn.query_row("SELECT record FROM sync_status WHERE singleton = 1", [], |row| {
                    row.get::<_, String>(0)
                })
                .optional()
                .map_err(map_sql_error)
            })
            .await?;

        raw.map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| ChecksyncError::Storage(format!("unreadable sync status: {e}")))
        })
        .transpose()
    }

    async fn save_sync_status(&self, status: &SyncStatusRecord) -> Result<()> {
        let record = serde_json::to_string(status).map_err(InfraError::from)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_status (singleton, record, updated_at)
                 VALUES (1, ?1, CAST(strftime('%s','now') AS INTEGER))
                 ON CONFLICT(singleton) DO UPDATE SET
                     record = excluded.record,
                     updated_at = excluded.updated_at",
                params![record],
            )
            .map(|_| ())
            .map_err(map_sql_error)
        })
        .await
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn map_sql_error(err: rusqlite::Error) -> ChecksyncError {
    ChecksyncError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> ChecksyncError {
    ChecksyncError::from(InfraError::from(err))
}
