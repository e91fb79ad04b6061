// Error types for the storage and blob layers

use thiserror::Error;

/// Failures inside a key-value storage area
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would push the area past its byte quota. Nothing was written.
    #[error("storage quota exceeded writing {key}: {needed} bytes needed, {quota} bytes allowed")]
    QuotaExceeded { key: String, needed: u64, quota: u64 },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Failures inside the blob database
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("failed to open database {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The stored schema is newer than the version asked for
    #[error("database {name} is at version {stored}, cannot open as version {requested}")]
    Version { name: String, requested: u32, stored: u32 },

    #[error("transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("database connection lock poisoned")]
    Poisoned,
}
