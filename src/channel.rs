// Named broadcast channels shared by every context in the process

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of undelivered messages a slow listener may fall behind by
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Wire shape of a bus message: `{ "event": ..., "data": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

/// One logical channel. Every listener sees every post made after it started listening.
#[derive(Debug)]
pub struct Channel {
    name: String,
    tx: broadcast::Sender<Envelope>,
}

impl Channel {
    fn new(name: &str, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            name: name.to_string(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a message to all current listeners.
    ///
    /// Returns the number of listeners it was queued for. A post with no
    /// listeners is dropped.
    pub fn post(&self, envelope: Envelope) -> usize {
        // send() only fails when nobody is listening
        self.tx.send(envelope).unwrap_or(0)
    }

    /// Start listening. Only messages posted after this call are observed.
    pub fn listen(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

/// Maps channel names to channels; opening a name twice yields the same channel
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    capacity: usize,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Open (or join) the channel with the given name
    pub fn open(&self, name: &str) -> Arc<Channel> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(channel = name, capacity = self.capacity, "Creating channel");
                Arc::new(Channel::new(name, self.capacity))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_same_name_shares_channel() {
        let registry = ChannelRegistry::new();
        let a = registry.open("eng_workspace_channel");
        let b = registry.open("eng_workspace_channel");
        let c = registry.open("other");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.name(), "eng_workspace_channel");
    }

    #[test]
    fn test_registries_do_not_share_channels() {
        let first = ChannelRegistry::new();
        let second = ChannelRegistry::new();

        let mut rx = first.open("eng_workspace_channel").listen();
        let delivered = second.open("eng_workspace_channel").post(Envelope {
            event: "task_added".to_string(),
            data: Value::Null,
        });

        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_post_without_listeners_is_dropped() {
        let registry = ChannelRegistry::new();
        let channel = registry.open("quiet");

        let delivered = channel.post(Envelope {
            event: "task_added".to_string(),
            data: json!({"id": 1}),
        });
        assert_eq!(delivered, 0);

        // A listener that joins later does not see the earlier post
        let mut rx = channel.listen();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_post_reaches_every_listener() {
        let registry = ChannelRegistry::new();
        let channel = registry.open("fanout");
        let mut rx1 = channel.listen();
        let mut rx2 = registry.open("fanout").listen();

        let envelope = Envelope {
            event: "notes_updated".to_string(),
            data: json!(["a", "b"]),
        };
        assert_eq!(channel.post(envelope.clone()), 2);

        assert_eq!(rx1.try_recv().unwrap(), envelope);
        assert_eq!(rx2.try_recv().unwrap(), envelope);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope {
            event: "files_updated".to_string(),
            data: Value::Null,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"event":"files_updated","data":null}"#);
    }
}
