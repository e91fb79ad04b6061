// Workspace configuration

use crate::connection::{DATABASE_NAME, DATABASE_VERSION};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHANNEL_NAME: &str = "eng_workspace_channel";

/// 5 MiB, the usual browser local storage allowance
pub const DEFAULT_STORAGE_QUOTA: u64 = 5 * 1024 * 1024;

/// Settings shared by every context of one workspace.
///
/// Every field is optional in the YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Contexts on the same channel name hear each other's events
    pub channel_name: String,
    /// Holds the key-value file and the blob database
    pub data_dir: PathBuf,
    /// Byte limit for the key-value store; `null` for unlimited
    pub storage_quota_bytes: Option<u64>,
    pub database_name: String,
    pub database_version: u32,
    /// When false, contexts behave as if the host had no database
    pub blob_storage_enabled: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            data_dir: default_data_dir(),
            storage_quota_bytes: Some(DEFAULT_STORAGE_QUOTA),
            database_name: DATABASE_NAME.to_string(),
            database_version: DATABASE_VERSION,
            blob_storage_enabled: true,
        }
    }
}

impl WorkspaceConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).context("Failed to parse YAML")?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Defaults with everything kept under `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            data_dir: dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workspace-core")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.channel_name, "eng_workspace_channel");
        assert_eq!(config.storage_quota_bytes, Some(DEFAULT_STORAGE_QUOTA));
        assert_eq!(config.database_name, "FileManagerDB_V6");
        assert_eq!(config.database_version, 1);
        assert!(config.blob_storage_enabled);
        assert!(config.data_dir.ends_with("workspace-core"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = WorkspaceConfig::from_yaml(
            r#"
channel_name: team_channel
storage_quota_bytes: null
blob_storage_enabled: false
"#,
        )
        .unwrap();

        assert_eq!(config.channel_name, "team_channel");
        assert_eq!(config.storage_quota_bytes, None);
        assert!(!config.blob_storage_enabled);
        assert_eq!(config.database_name, DATABASE_NAME);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("workspace.yaml");
        fs::write(&path, "data_dir: /tmp/ws\ndatabase_version: 2\n").unwrap();

        let config = WorkspaceConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ws"));
        assert_eq!(config.database_version, 2);

        assert!(WorkspaceConfig::load(&temp.path().join("missing.yaml")).is_err());
        assert_eq!(WorkspaceConfig::load_or_default(None).unwrap(), WorkspaceConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(WorkspaceConfig::from_yaml("storage_quota_bytes: lots").is_err());
        assert_eq!(WorkspaceConfig::from_yaml("").unwrap(), WorkspaceConfig::default());
    }
}
