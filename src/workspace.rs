// Workspace substrate and per-page contexts

use crate::blob::BlobStore;
use crate::bus::EventBus;
use crate::channel::ChannelRegistry;
use crate::config::WorkspaceConfig;
use crate::connection::{ConnectionManager, DatabaseLocation};
use crate::error::StorageError;
use crate::host::{TracingAlert, UserAlert};
use crate::kv::KeyValueStore;
use crate::search::SearchIndex;
use crate::store::SqliteArea;
use std::sync::Arc;
use tracing::info;

/// What every page of one workspace shares: configuration and the channel registry.
///
/// Pages never share in-memory handles; each gets its own [`Context`].
pub struct Workspace {
    config: WorkspaceConfig,
    registry: Arc<ChannelRegistry>,
    alert: Arc<dyn UserAlert>,
}

impl Workspace {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ChannelRegistry::new()),
            alert: Arc::new(TracingAlert),
        }
    }

    /// Route quota warnings to `alert` instead of the log
    pub fn with_alert(mut self, alert: Arc<dyn UserAlert>) -> Self {
        self.alert = alert;
        self
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Set up the facilities for one page
    pub fn open_context(&self, label: &str) -> Result<Context, StorageError> {
        let bus = Arc::new(EventBus::new(self.registry.open(&self.config.channel_name)));

        let area = SqliteArea::open(&self.config.data_dir, self.config.storage_quota_bytes)?;
        let storage = KeyValueStore::new(Arc::new(area), Arc::clone(&bus), Arc::clone(&self.alert));

        let connection = if self.config.blob_storage_enabled {
            ConnectionManager::new(
                DatabaseLocation::Directory(self.config.data_dir.clone()),
                &self.config.database_name,
                self.config.database_version,
            )
        } else {
            ConnectionManager::unsupported()
        };
        let files = BlobStore::new(Arc::new(connection), Arc::clone(&bus));

        info!(context = label, channel = %self.config.channel_name, "Context opened");
        Ok(Context {
            label: label.to_string(),
            bus,
            search: SearchIndex::new(storage.clone()),
            storage,
            files,
        })
    }
}

/// One page's bus, key-value store, search and blob store
pub struct Context {
    label: String,
    bus: Arc<EventBus>,
    storage: KeyValueStore,
    search: SearchIndex,
    files: BlobStore,
}

impl Context {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn storage(&self) -> &KeyValueStore {
        &self.storage
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn files(&self) -> &BlobStore {
        &self.files
    }
}
