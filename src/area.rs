// String-keyed, string-valued storage areas

use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Object-safe key/value storage area.
///
/// Each call is atomic on its own; there is no isolation across calls.
pub trait StorageArea: Send + Sync {
    /// Raw value for `key`, or `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// Fails with [`StorageError::QuotaExceeded`] when the write would not fit,
    /// leaving the previous value in place.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Removing an absent key succeeds.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// All keys, sorted
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Bytes counted against the quota (key + value lengths)
    fn used_bytes(&self) -> Result<u64, StorageError>;
}

/// Size charged for one entry
pub(crate) fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// Check that replacing `previous` with `value` under `key` keeps `used` within `quota`
pub(crate) fn check_quota(
    key: &str,
    value: &str,
    previous: Option<&str>,
    used: u64,
    quota: Option<u64>,
) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let freed = previous.map(|p| entry_size(key, p)).unwrap_or(0);
    let needed = used.saturating_sub(freed) + entry_size(key, value);
    if needed > quota {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            needed,
            quota,
        });
    }
    Ok(())
}

/// In-memory area with an optional byte quota. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryArea {
    map: Mutex<HashMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorageArea for MemoryArea {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map();
        let used: u64 = map.iter().map(|(k, v)| entry_size(k, v)).sum();
        check_quota(key, value, map.get(key).map(String::as_str), used, self.quota)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.map().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.map().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.map().len())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self.map().keys().cloned().collect();
        keys.sort_unstable();
        Ok(keys)
    }

    fn used_bytes(&self) -> Result<u64, StorageError> {
        Ok(self.map().iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}
