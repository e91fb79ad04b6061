// Transactional store for file attachments and their previews

use crate::bus::EventBus;
use crate::connection::{ConnectionManager, DbHandle, OBJECT_STORE};
use crate::error::BlobError;
use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Topic emitted after a file is saved or deleted
pub const FILES_UPDATED: &str = "files_updated";

/// A stored attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub id: String,
    pub file_blob: Vec<u8>,
    /// Thumbnail or other preview; not every file has one
    pub preview_blob: Option<Vec<u8>>,
    /// Milliseconds since the epoch at save time
    pub created: i64,
}

/// Async blob store over the context's lazily opened database.
///
/// Every operation is one transaction. None of them return errors: failures
/// are logged and reported as `false`/`None`, and a host without a database
/// behaves like an empty store that refuses writes.
pub struct BlobStore {
    connection: Arc<ConnectionManager>,
    bus: Arc<EventBus>,
}

impl BlobStore {
    pub fn new(connection: Arc<ConnectionManager>, bus: Arc<EventBus>) -> Self {
        Self { connection, bus }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Open the database if this context has not yet; `Ok(None)` when unsupported
    pub async fn init(&self) -> Result<Option<DbHandle>, BlobError> {
        self.connection.acquire().await
    }

    /// Insert or replace the record for `id`, then announce it on [`FILES_UPDATED`]
    pub async fn save_file(&self, id: &str, file_blob: Vec<u8>, preview_blob: Option<Vec<u8>>) -> bool {
        let record = BlobRecord {
            id: id.to_string(),
            file_blob,
            preview_blob,
            created: crate::now_ms(),
        };
        info!(id, bytes = record.file_blob.len(), "Saving file");

        match self.try_save(record).await {
            Ok(true) => {
                info!(id, "File saved");
                self.bus.emit_value(FILES_UPDATED, Value::Null);
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(id, error = %e, "Failed to save file");
                false
            }
        }
    }

    async fn try_save(&self, record: BlobRecord) -> Result<bool, BlobError> {
        let Some(db) = self.init().await? else {
            return Ok(false);
        };

        db.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO {OBJECT_STORE} (id, file_blob, preview_blob, created)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                rusqlite::params![record.id, record.file_blob, record.preview_blob, record.created],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(true)
    }

    /// The record stored under `id`, or `None` if absent or unavailable
    pub async fn get_file(&self, id: &str) -> Option<BlobRecord> {
        match self.try_get(id.to_string()).await {
            Ok(Some(record)) => {
                debug!(id, "File read");
                Some(record)
            }
            Ok(None) => {
                debug!(id, "File not found");
                None
            }
            Err(e) => {
                error!(id, error = %e, "Failed to read file");
                None
            }
        }
    }

    async fn try_get(&self, id: String) -> Result<Option<BlobRecord>, BlobError> {
        let Some(db) = self.init().await? else {
            return Ok(None);
        };

        db.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let record = tx
                .query_row(
                    &format!("SELECT id, file_blob, preview_blob, created FROM {OBJECT_STORE} WHERE id = ?1"),
                    [&id],
                    |row| {
                        Ok(BlobRecord {
                            id: row.get(0)?,
                            file_blob: row.get(1)?,
                            preview_blob: row.get(2)?,
                            created: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    /// Delete the record for `id`, then announce it on [`FILES_UPDATED`].
    ///
    /// Deleting an absent id still succeeds and still announces.
    pub async fn delete_file(&self, id: &str) -> bool {
        info!(id, "Deleting file");

        match self.try_delete(id.to_string()).await {
            Ok(true) => {
                info!(id, "File deleted");
                self.bus.emit_value(FILES_UPDATED, Value::Null);
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(id, error = %e, "Failed to delete file");
                false
            }
        }
    }

    async fn try_delete(&self, id: String) -> Result<bool, BlobError> {
        let Some(db) = self.init().await? else {
            return Ok(false);
        };

        db.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(&format!("DELETE FROM {OBJECT_STORE} WHERE id = ?1"), [&id])?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(true)
    }

    /// Empty the whole store.
    ///
    /// Unlike save and delete, this does not emit [`FILES_UPDATED`].
    pub async fn clear_all(&self) {
        info!("Clearing all files");

        match self.try_clear().await {
            Ok(true) => info!("All files cleared"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Failed to clear files"),
        }
    }

    async fn try_clear(&self) -> Result<bool, BlobError> {
        let Some(db) = self.init().await? else {
            return Ok(false);
        };

        db.run(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(&format!("DELETE FROM {OBJECT_STORE}"), [])?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        Ok(true)
    }

    /// Ids of all stored files, oldest first
    pub async fn file_ids(&self) -> Vec<String> {
        self.try_list().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to list files");
            Vec::new()
        })
    }

    async fn try_list(&self) -> Result<Vec<String>, BlobError> {
        let Some(db) = self.init().await? else {
            return Ok(Vec::new());
        };

        db.run(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT id FROM {OBJECT_STORE} ORDER BY created, id"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
    }
}
