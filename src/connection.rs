// Lazily opened, per-context handle to the blob database

use crate::error::BlobError;
use crate::store::BUSY_TIMEOUT;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DATABASE_NAME: &str = "FileManagerDB_V6";
pub const DATABASE_VERSION: u32 = 1;
/// The one object store, keyed by `id`
pub const OBJECT_STORE: &str = "files";

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// `<dir>/<name>.sqlite3`, shared by every context opening the same directory
    Directory(PathBuf),
    /// Private to the opening context
    InMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Opening,
    Ready,
    /// The host has no database; every operation degrades to an empty result
    Unsupported,
}

/// An open, schema-bootstrapped database
#[derive(Debug)]
pub struct Database {
    name: String,
    version: u32,
    conn: Mutex<Connection>,
    upgraded: bool,
}

impl Database {
    /// Open `name` at `version`, creating the object store on upgrade
    pub fn open(location: &DatabaseLocation, name: &str, version: u32) -> Result<Self, BlobError> {
        let open_err = |source| BlobError::Open {
            name: name.to_string(),
            source,
        };

        let mut conn = match location {
            DatabaseLocation::Directory(dir) => {
                fs::create_dir_all(dir)?;
                let conn = Connection::open(dir.join(format!("{}.sqlite3", name))).map_err(open_err)?;
                conn.busy_timeout(BUSY_TIMEOUT).map_err(open_err)?;
                // Readers see the last commit instead of waiting on a writer
                let _mode: String = conn
                    .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                    .map_err(open_err)?;
                conn
            }
            DatabaseLocation::InMemory => Connection::open_in_memory().map_err(open_err)?,
        };

        let stored: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(open_err)?;

        if stored > version {
            return Err(BlobError::Version {
                name: name.to_string(),
                requested: version,
                stored,
            });
        }

        let upgraded = stored < version;
        if upgraded {
            Self::upgrade(&mut conn, stored, version)?;
            info!(name, from = stored, to = version, "Database upgraded");
        }

        Ok(Self {
            name: name.to_string(),
            version,
            conn: Mutex::new(conn),
            upgraded,
        })
    }

    /// Schema bootstrap; runs only when the stored version is behind
    fn upgrade(conn: &mut Connection, from: u32, to: u32) -> Result<(), BlobError> {
        debug!(from, to, "Running schema upgrade");

        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {OBJECT_STORE} (
                id TEXT PRIMARY KEY NOT NULL,
                file_blob BLOB NOT NULL,
                preview_blob BLOB,
                created INTEGER NOT NULL
            );
            "#
        ))?;
        tx.pragma_update(None, "user_version", to)?;
        tx.commit()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether opening this handle ran the schema upgrade
    pub fn upgraded(&self) -> bool {
        self.upgraded
    }

    pub fn has_object_store(&self) -> Result<bool, BlobError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [OBJECT_STORE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BlobError> {
        self.conn.lock().map_err(|_| BlobError::Poisoned)
    }

    /// Run `op` against the connection on the blocking pool and wait for it
    pub async fn run<T, F>(self: &Arc<Self>, op: F) -> Result<T, BlobError>
    where
        F: FnOnce(&mut Connection) -> Result<T, BlobError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.conn()?;
            op(&mut conn)
        })
        .await?
    }
}

pub type DbHandle = Arc<Database>;

/// Owns the context's database handle.
///
/// The first `acquire()` opens the database; later calls return the same
/// handle. A failed open is not cached, so the next call tries again.
#[derive(Debug)]
pub struct ConnectionManager {
    location: Option<DatabaseLocation>,
    name: String,
    version: u32,
    handle: OnceCell<DbHandle>,
    opening: AtomicBool,
}

impl ConnectionManager {
    pub fn new(location: DatabaseLocation, name: &str, version: u32) -> Self {
        Self {
            location: Some(location),
            name: name.to_string(),
            version,
            handle: OnceCell::new(),
            opening: AtomicBool::new(false),
        }
    }

    /// Default database identity at `location`
    pub fn with_defaults(location: DatabaseLocation) -> Self {
        Self::new(location, DATABASE_NAME, DATABASE_VERSION)
    }

    /// Manager for a host without database support
    pub fn unsupported() -> Self {
        warn!("Database storage is not supported on this host");
        Self {
            location: None,
            name: DATABASE_NAME.to_string(),
            version: DATABASE_VERSION,
            handle: OnceCell::new(),
            opening: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.location.is_none() {
            ConnectionState::Unsupported
        } else if self.handle.initialized() {
            ConnectionState::Ready
        } else if self.opening.load(Ordering::Acquire) {
            ConnectionState::Opening
        } else {
            ConnectionState::Uninitialized
        }
    }

    /// Current handle, opening the database on first use.
    ///
    /// `Ok(None)` means the host has no database; callers treat the feature
    /// as unavailable.
    pub async fn acquire(&self) -> Result<Option<DbHandle>, BlobError> {
        let Some(location) = &self.location else {
            return Ok(None);
        };

        if let Some(handle) = self.handle.get() {
            return Ok(Some(Arc::clone(handle)));
        }

        let handle = self
            .handle
            .get_or_try_init(|| async {
                self.opening.store(true, Ordering::Release);
                info!(name = %self.name, version = self.version, "Opening database");

                let location = location.clone();
                let name = self.name.clone();
                let version = self.version;
                let opened = tokio::task::spawn_blocking(move || Database::open(&location, &name, version)).await;

                self.opening.store(false, Ordering::Release);
                let db = opened??;
                Ok::<_, BlobError>(Arc::new(db))
            })
            .await?;

        Ok(Some(Arc::clone(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::fmt::MakeWriter;

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let manager = ConnectionManager::with_defaults(DatabaseLocation::InMemory);
        assert_eq!(manager.state(), ConnectionState::Uninitialized);

        let first = manager.acquire().await.unwrap().unwrap();
        let second = manager.acquire().await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.upgraded());
        assert!(first.has_object_store().unwrap());
        assert_eq!(first.name(), DATABASE_NAME);
        assert_eq!(first.version(), DATABASE_VERSION);
        assert_eq!(manager.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once_per_database() {
        let temp = TempDir::new().unwrap();
        let location = DatabaseLocation::Directory(temp.path().to_path_buf());

        let page_a = ConnectionManager::with_defaults(location.clone());
        let db_a = page_a.acquire().await.unwrap().unwrap();
        assert!(db_a.upgraded());
        assert!(temp.path().join(format!("{}.sqlite3", DATABASE_NAME)).exists());

        let mode: String = db_a
            .conn()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        // Another context opening the same database finds the schema in place
        let page_b = ConnectionManager::with_defaults(location);
        let db_b = page_b.acquire().await.unwrap().unwrap();
        assert!(!db_b.upgraded());
        assert!(db_b.has_object_store().unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_host_yields_none() {
        let manager = ConnectionManager::unsupported();
        assert_eq!(manager.state(), ConnectionState::Unsupported);
        assert!(manager.acquire().await.unwrap().is_none());
        assert_eq!(manager.state(), ConnectionState::Unsupported);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_unsupported_host_warns_once() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let manager = ConnectionManager::unsupported();
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                for _ in 0..3 {
                    assert!(manager.acquire().await.unwrap().is_none());
                }
            });
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("not supported").count(), 1);
    }

    #[tokio::test]
    async fn test_newer_stored_version_fails_and_is_retried() {
        let temp = TempDir::new().unwrap();
        let location = DatabaseLocation::Directory(temp.path().to_path_buf());

        let newer = ConnectionManager::new(location.clone(), DATABASE_NAME, 3);
        newer.acquire().await.unwrap().unwrap();

        let older = ConnectionManager::new(location, DATABASE_NAME, DATABASE_VERSION);
        let err = older.acquire().await.unwrap_err();
        assert!(matches!(err, BlobError::Version { stored: 3, requested: 1, .. }));
        assert_eq!(older.state(), ConnectionState::Uninitialized);
        assert!(older.acquire().await.is_err());
    }

    #[test]
    fn test_open_blocking() {
        let db = Database::open(&DatabaseLocation::InMemory, "scratch", 2).unwrap();
        assert!(db.upgraded());
        assert_eq!(db.version(), 2);
        assert!(db.has_object_store().unwrap());
    }
}
