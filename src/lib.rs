// Workspace core - shared persistence and messaging for multi-page workspaces

pub mod area;
pub mod blob;
pub mod bus;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod jsonl;
pub mod kv;
pub mod models;
pub mod record;
pub mod search;
pub mod store;
pub mod util;
pub mod workspace;

// Re-export main types for convenience
pub use area::{MemoryArea, StorageArea};
pub use blob::{BlobRecord, BlobStore, FILES_UPDATED};
pub use bus::EventBus;
pub use channel::{ChannelRegistry, Envelope};
pub use config::WorkspaceConfig;
pub use connection::{ConnectionManager, ConnectionState, DatabaseLocation};
pub use error::{BlobError, StorageError};
pub use kv::KeyValueStore;
pub use models::now_ms;
pub use record::CollectionRecord;
pub use search::{ResultKind, SearchIndex, SearchResult};
pub use store::SqliteArea;
pub use workspace::{Context, Workspace};
