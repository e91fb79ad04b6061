// Topic-based publish/subscribe over a shared named channel

use crate::channel::{Channel, Envelope};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

type Handler = Arc<dyn Fn(&Value) + Send + Sync + 'static>;
type HandlerMap = Mutex<HashMap<String, Vec<Handler>>>;

/// One context's view of the shared bus.
///
/// Every context that opens the same channel name sees every message emitted
/// on it, including its own. Handlers run on a dispatcher thread owned by
/// this context, one message at a time, in the order messages arrived.
/// There is no unsubscribe: handlers live as long as the bus. Dropping the
/// bus stops its dispatcher, waiting for a handler that is already running.
pub struct EventBus {
    channel: Arc<Channel>,
    handlers: Arc<HandlerMap>,
    dispatcher: OnceLock<Option<Dispatcher>>,
}

struct Dispatcher {
    shutdown: oneshot::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl EventBus {
    pub fn new(channel: Arc<Channel>) -> Self {
        Self {
            channel,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: OnceLock::new(),
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Send `payload` under `topic` to every listening context.
    ///
    /// Never blocks on delivery and never fails: with no listeners the message is lost.
    pub fn emit<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) {
        let data = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                error!(topic, error = %e, "Failed to serialize event payload, not emitted");
                return;
            }
        };
        self.emit_value(topic, data);
    }

    pub fn emit_value(&self, topic: &str, data: Value) {
        info!(channel = self.channel.name(), topic, %data, "Event emitted");
        let listeners = self.channel.post(Envelope {
            event: topic.to_string(),
            data,
        });
        debug!(topic, listeners, "Event queued");
    }

    /// Register `handler` for messages whose topic equals `topic` exactly
    pub fn subscribe<F>(&self, topic: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        {
            let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.entry(topic.to_string()).or_default().push(Arc::new(handler));
        }
        self.dispatcher.get_or_init(|| self.start_dispatcher());
        debug!(channel = self.channel.name(), topic, "Handler subscribed");
    }

    fn start_dispatcher(&self) -> Option<Dispatcher> {
        // Listen before returning so that anything emitted after subscribe() is seen
        let rx = self.channel.listen();
        let handlers = Arc::downgrade(&self.handlers);
        let (shutdown, stop) = oneshot::channel();
        let name = format!("bus-{}", self.channel.name());

        match thread::Builder::new()
            .name(name)
            .spawn(move || dispatch_loop(rx, stop, handlers))
        {
            Ok(thread) => Some(Dispatcher { shutdown, thread }),
            Err(e) => {
                error!(channel = self.channel.name(), error = %e, "Failed to start bus dispatcher");
                None
            }
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        let Some(Some(dispatcher)) = self.dispatcher.take() else {
            return;
        };
        drop(dispatcher.shutdown);

        // A handler may drop the last reference to its own bus
        if dispatcher.thread.thread().id() == thread::current().id() {
            return;
        }
        if dispatcher.thread.join().is_err() {
            error!(channel = self.channel.name(), "Bus dispatcher exited abnormally");
        }
    }
}

fn dispatch_loop(mut rx: broadcast::Receiver<Envelope>, mut stop: oneshot::Receiver<()>, handlers: Weak<HandlerMap>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build bus dispatcher runtime");
            return;
        }
    };

    loop {
        // Handlers run outside the runtime so they may block freely
        let next = runtime.block_on(async {
            tokio::select! {
                _ = &mut stop => None,
                received = rx.recv() => Some(received),
            }
        });

        let envelope = match next {
            None => break,
            Some(Ok(envelope)) => envelope,
            Some(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "Bus listener fell behind, messages dropped");
                continue;
            }
            Some(Err(RecvError::Closed)) => break,
        };

        // The owning bus is gone; stop listening
        let Some(handlers) = handlers.upgrade() else {
            break;
        };

        let matched: Vec<Handler> = {
            let map = handlers.lock().unwrap_or_else(|e| e.into_inner());
            map.get(&envelope.event).cloned().unwrap_or_default()
        };
        drop(handlers);

        if matched.is_empty() {
            continue;
        }

        info!(topic = %envelope.event, data = %envelope.data, "Event received");
        for handler in matched {
            if catch_unwind(AssertUnwindSafe(|| handler(&envelope.data))).is_err() {
                error!(topic = %envelope.event, "Event handler panicked");
            }
        }
    }
    debug!("Bus dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn pair(registry: &ChannelRegistry) -> (EventBus, EventBus) {
        (
            EventBus::new(registry.open("eng_workspace_channel")),
            EventBus::new(registry.open("eng_workspace_channel")),
        )
    }

    #[test]
    fn test_emit_reaches_other_context() {
        let registry = ChannelRegistry::new();
        let (page_a, page_b) = pair(&registry);

        let (tx, rx) = mpsc::channel();
        page_b.subscribe("task_added", move |data| {
            tx.send(data.clone()).unwrap();
        });

        page_a.emit("task_added", &json!({"id": "task_1", "title": "Deploy"}));

        let got = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(got, json!({"id": "task_1", "title": "Deploy"}));
    }

    #[test]
    fn test_emitter_observes_own_message() {
        let registry = ChannelRegistry::new();
        let bus = EventBus::new(registry.open("self"));

        let (tx, rx) = mpsc::channel();
        bus.subscribe("ping", move |data| {
            tx.send(data.clone()).unwrap();
        });
        bus.emit("ping", &1);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), json!(1));
    }

    #[test]
    fn test_other_topics_are_not_delivered() {
        let registry = ChannelRegistry::new();
        let (page_a, page_b) = pair(&registry);

        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        page_b.subscribe("notes_updated", move |_| {
            tx.send("notes").unwrap();
        });
        page_b.subscribe("todos_updated", move |_| {
            tx2.send("todos").unwrap();
        });

        page_a.emit("todos_updated", &json!([]));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "todos");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_same_topic_is_fifo() {
        let registry = ChannelRegistry::new();
        let (page_a, page_b) = pair(&registry);

        let (tx, rx) = mpsc::channel();
        page_b.subscribe("counter", move |data| {
            tx.send(data.as_i64().unwrap()).unwrap();
        });

        for i in 0..50 {
            page_a.emit("counter", &i);
        }

        let got: Vec<i64> = (0..50).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_handler_sees_message_once() {
        let registry = ChannelRegistry::new();
        let (page_a, page_b) = pair(&registry);
        let page_c = EventBus::new(registry.open("eng_workspace_channel"));

        let (tx, rx) = mpsc::channel();
        for (label, bus) in [("b1", &page_b), ("b2", &page_b), ("c", &page_c)] {
            let tx = tx.clone();
            bus.subscribe("files_updated", move |_| {
                tx.send(label).unwrap();
            });
        }

        page_a.emit_value("files_updated", Value::Null);

        let mut got: Vec<&str> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        got.sort_unstable();
        assert_eq!(got, vec!["b1", "b2", "c"]);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_emit_without_listeners_is_silent() {
        let registry = ChannelRegistry::new();
        let bus = EventBus::new(registry.open("nobody"));
        bus.emit("lost", &"into the void");
        assert_eq!(bus.channel_name(), "nobody");
    }

    #[test]
    fn test_dropping_bus_stops_dispatcher_on_quiet_channel() {
        let registry = ChannelRegistry::new();
        let channel = registry.open("quiet");

        let bus = EventBus::new(Arc::clone(&channel));
        bus.subscribe("anything", |_| {});
        drop(bus);

        // No traffic was needed for the dispatcher to let go of its listener
        let delivered = channel.post(Envelope {
            event: "anything".to_string(),
            data: Value::Null,
        });
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let registry = ChannelRegistry::new();
        let bus = EventBus::new(registry.open("panics"));

        let (tx, rx) = mpsc::channel();
        bus.subscribe("boom", |_| panic!("handler failure"));
        bus.subscribe("after", move |_| {
            tx.send(()).unwrap();
        });

        bus.emit("boom", &());
        bus.emit("after", &());
        assert!(rx.recv_timeout(WAIT).is_ok());
    }
}
