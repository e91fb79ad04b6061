// JSON key-value store with fallbacks, change notifications and quota alerts

use crate::area::StorageArea;
use crate::bus::EventBus;
use crate::host::{QUOTA_ALERT, UserAlert};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error};

/// Synchronous JSON view over a [`StorageArea`].
///
/// No call returns an error. Unreadable values turn into the caller's
/// fallback, rejected writes are logged (and alerted on when the quota is hit).
#[derive(Clone)]
pub struct KeyValueStore {
    area: Arc<dyn StorageArea>,
    bus: Arc<EventBus>,
    alert: Arc<dyn UserAlert>,
}

impl KeyValueStore {
    pub fn new(area: Arc<dyn StorageArea>, bus: Arc<EventBus>, alert: Arc<dyn UserAlert>) -> Self {
        Self { area, bus, alert }
    }

    /// Read `key` as `T`.
    ///
    /// Returns `fallback` when the key is absent, stored as `null`/`undefined`,
    /// unreadable, or does not parse as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let raw = match self.area.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback,
            Err(e) => {
                error!(key, error = %e, "Failed to read storage");
                return fallback;
            }
        };

        if raw.is_empty() || raw == "undefined" || raw == "null" {
            return fallback;
        }

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "Stored value is not valid JSON for the requested type");
                fallback
            }
        }
    }

    /// Write `value` under `key`, then emit it on `notify_topic` if one is given.
    ///
    /// Nothing is emitted when the write fails.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, notify_topic: Option<&str>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                error!(key, error = %e, "Failed to serialize value");
                return;
            }
        };

        if let Err(e) = self.area.set_item(key, &value.to_string()) {
            error!(key, error = %e, "Failed to write storage");
            if e.is_quota_exceeded() {
                self.alert.alert(QUOTA_ALERT);
            }
            return;
        }
        debug!(key, "Saved");

        if let Some(topic) = notify_topic {
            self.bus.emit_value(topic, value);
        }
    }

    /// Delete `key`; absent keys are fine
    pub fn remove(&self, key: &str) {
        match self.area.remove_item(key) {
            Ok(()) => debug!(key, "Removed"),
            Err(e) => error!(key, error = %e, "Failed to remove from storage"),
        }
    }

    /// Every stored key, sorted
    pub fn keys(&self) -> Vec<String> {
        self.area.keys().unwrap_or_else(|e| {
            error!(error = %e, "Failed to list storage keys");
            Vec::new()
        })
    }

    pub fn area(&self) -> &Arc<dyn StorageArea> {
        &self.area
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
