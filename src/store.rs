// Persistent storage area backed by SQLite

use crate::area::{StorageArea, check_quota, entry_size};
use crate::error::StorageError;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const CURRENT_VERSION: u32 = 1;

/// Longest lock wait SQLite accepts. Another context's lock is waited out, not reported.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// File name of the key-value database inside the data directory
pub const STORAGE_FILE: &str = "local_storage.db";

/// Persistent string map shared by every context that opens the same file.
///
/// Each call runs in its own SQLite transaction. Two contexts writing the
/// same key race; the last commit wins.
pub struct SqliteArea {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
    quota: Option<u64>,
}

impl SqliteArea {
    /// Open or create the storage file inside `dir`
    pub fn open<P: AsRef<Path>>(dir: P, quota: Option<u64>) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(STORAGE_FILE);
        let db = Connection::open(&path)?;
        db.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        let area = Self {
            path: Some(path),
            db: Mutex::new(db),
            quota,
        };
        area.create_schema()?;

        info!(path = ?area.path, ?quota, "Opened storage area");
        Ok(area)
    }

    /// Private, non-persistent area (tests, ephemeral contexts)
    pub fn open_in_memory(quota: Option<u64>) -> Result<Self, StorageError> {
        let area = Self {
            path: None,
            db: Mutex::new(Connection::open_in_memory()?),
            quota,
        };
        area.create_schema()?;
        Ok(area)
    }

    /// Location of the database file, `None` for in-memory areas
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        debug!("Creating storage schema");

        let db = self.db();
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS local_storage (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        let version: u32 = db.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < CURRENT_VERSION {
            db.pragma_update(None, "user_version", CURRENT_VERSION)?;
        }

        Ok(())
    }

    fn used_bytes_in(conn: &Connection) -> Result<u64, StorageError> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM local_storage",
            [],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }
}

impl StorageArea for SqliteArea {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .db()
            .query_row("SELECT value FROM local_storage WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut db = self.db();

        // Quota check and write commit together
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if self.quota.is_some() {
            let previous: Option<String> = tx
                .query_row("SELECT value FROM local_storage WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            let used = Self::used_bytes_in(&tx)?;
            check_quota(key, value, previous.as_deref(), used, self.quota)?;
        }

        tx.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value, crate::now_ms()],
        )?;
        tx.commit()?;

        debug!(key, bytes = entry_size(key, value), "Stored item");
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.db()
            .execute("DELETE FROM local_storage WHERE key = ?1", [key])?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.db().execute("DELETE FROM local_storage", [])?;
        Ok(())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .db()
            .query_row("SELECT COUNT(*) FROM local_storage", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let db = self.db();
        let mut stmt = db.prepare("SELECT key FROM local_storage ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<u64, StorageError> {
        Self::used_bytes_in(&self.db())
    }
}
