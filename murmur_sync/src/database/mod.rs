pub mod models;
pub mod repositories;

use crate::config::MurmurPaths;
use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::fs;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Violations of invariants the store is supposed to uphold. These are
/// surfaced to the caller as typed errors instead of being swallowed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    #[error("unknown notification: {0}")]
    UnknownNotification(String),
}

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS content (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trx_id TEXT NOT NULL UNIQUE,
        group_id TEXT NOT NULL,
        publisher TEXT,
        kind TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        body TEXT NOT NULL,
        object_trx_id TEXT,
        thread_trx_id TEXT,
        reply_trx_id TEXT,
        status TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_content_group_publisher ON content(group_id, publisher);
    CREATE INDEX IF NOT EXISTS idx_content_group_timestamp ON content(group_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_content_target ON content(group_id, kind, object_trx_id);

    CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL,
        publisher TEXT NOT NULL,
        name TEXT NOT NULL,
        avatar TEXT NOT NULL,
        external_account_id TEXT,
        timestamp INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_profiles_group_publisher ON profiles(group_id, publisher);

    CREATE TABLE IF NOT EXISTS summary (
        group_id TEXT NOT NULL,
        object_id TEXT NOT NULL,
        object_type TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (group_id, object_id, object_type)
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL,
        object_trx_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notifications_group ON notifications(group_id, timestamp);

    CREATE TABLE IF NOT EXISTS sync_cursors (
        group_id TEXT PRIMARY KEY,
        latest_read_timestamp INTEGER NOT NULL DEFAULT 0,
        unread_count INTEGER NOT NULL DEFAULT 0,
        latest_object_timestamp INTEGER NOT NULL DEFAULT 0
    );
"#;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    newly_created: bool,
}

impl Database {
    pub fn connect(paths: &MurmurPaths) -> Result<Self> {
        if !paths.data_dir.exists() {
            fs::create_dir_all(&paths.data_dir)?;
        }
        let newly_created = !paths.db_path.exists();
        let conn = Connection::open(&paths.db_path)?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            newly_created,
        }
    }

    pub fn ensure_migrations(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    /// Runs `f` against plain repositories with no transaction. Suitable
    /// for reads and single-row writes.
    pub fn with_repositories<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let repos = repositories::SqliteRepositories::new(conn);
            f(repos)
        })
    }

    /// Runs `f` inside a single transaction spanning every table. Either
    /// all writes performed by `f` are durably applied or none are.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let result = f(repositories::SqliteRepositories::new(&tx));
            match result {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        tracing::warn!(error = ?rollback_err, "failed to roll back transaction");
                    }
                    Err(err)
                }
            }
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        f(&guard)
    }
}
