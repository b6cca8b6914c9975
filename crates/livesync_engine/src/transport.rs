//! Push transport abstraction.
//!
//! A push transport delivers named events on named channels. The engine only
//! needs to subscribe to a channel, bind handlers to event names and undo
//! both. Connection management and reconnection are the transport's concern.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared handle to a subscribed channel.
pub type ChannelRef = Arc<dyn Channel>;

/// Handler invoked with the raw payload of a channel event.
///
/// Errors are returned to the transport that delivered the event.
pub type EventHandler = Arc<dyn Fn(&Value) -> SyncResult<()> + Send + Sync>;

/// Sink for a transport's own diagnostic messages.
pub type TransportLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies one bound handler on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a transport-assigned listener number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw listener number.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// A subscribed channel on a push transport.
///
/// Several sync managers may share one channel. Handlers are therefore
/// unbound by [`ListenerId`], never by event name alone.
pub trait Channel: Send + Sync {
    /// Returns the full channel name, including any visibility prefix.
    fn name(&self) -> &str;

    /// Binds a handler to an event name.
    fn bind(&self, event: &str, handler: EventHandler) -> ListenerId;

    /// Unbinds one handler. Returns false if it was not bound.
    fn unbind(&self, event: &str, listener: ListenerId) -> bool;

    /// Returns false once the subscription behind this handle was released.
    fn is_subscribed(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// A push messaging transport.
pub trait PushTransport: Send + Sync {
    /// Subscribes to a channel, returning its handle.
    ///
    /// Subscribing twice to the same name returns the same channel.
    fn subscribe(&self, channel_name: &str) -> SyncResult<ChannelRef>;

    /// Releases a channel subscription.
    fn unsubscribe(&self, channel_name: &str) -> SyncResult<()>;

    /// Installs or removes this transport's diagnostic logger.
    fn set_logger(&self, _logger: Option<TransportLogger>) {}
}

/// Returns a logger forwarding transport diagnostics to `tracing`.
pub fn tracing_logger() -> TransportLogger {
    Arc::new(|message: &str| {
        tracing::debug!(target: "livesync::transport", "{}", message);
    })
}

struct Listener {
    event: String,
    id: ListenerId,
    handler: EventHandler,
}

/// An in-memory channel for testing and local fan-out.
pub struct MemoryChannel {
    name: String,
    listeners: RwLock<Vec<Listener>>,
    next_listener: AtomicU64,
    subscribed: AtomicBool,
}

impl MemoryChannel {
    /// Creates a new, subscribed channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            subscribed: AtomicBool::new(true),
        }
    }

    /// Delivers an event to every handler bound to it, in bind order.
    ///
    /// Every handler runs even if an earlier one fails; the first error is
    /// returned. Returns the number of handlers invoked. Nothing is delivered
    /// once the channel has been unsubscribed.
    pub fn emit(&self, event: &str, payload: &Value) -> SyncResult<usize> {
        if !self.is_subscribed() {
            return Ok(0);
        }

        // Handlers may bind or unbind while running, so no lock is held.
        let handlers: Vec<EventHandler> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.event == event)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        let mut first_error = None;
        for handler in &handlers {
            if let Err(e) = handler(payload) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(handlers.len()),
        }
    }

    /// Returns the number of handlers bound to an event.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.event == event)
            .count()
    }

    /// Returns the number of handlers bound to any event.
    pub fn total_listeners(&self) -> usize {
        self.listeners.read().len()
    }

    fn mark_unsubscribed(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("name", &self.name)
            .field("listeners", &self.total_listeners())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, event: &str, handler: EventHandler) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push(Listener {
            event: event.to_string(),
            id,
            handler,
        });
        id
    }

    fn unbind(&self, event: &str, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !(l.id == listener && l.event == event));
        listeners.len() != before
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }
}

/// An in-memory push transport for testing.
#[derive(Default)]
pub struct MemoryTransport {
    channels: RwLock<HashMap<String, Arc<MemoryChannel>>>,
    logger: RwLock<Option<TransportLogger>>,
    subscribe_calls: AtomicUsize,
    refuse_subscriptions: AtomicBool,
}

impl MemoryTransport {
    /// Creates a new transport with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a subscribed channel by full name.
    pub fn channel(&self, channel_name: &str) -> Option<Arc<MemoryChannel>> {
        self.channels.read().get(channel_name).cloned()
    }

    /// Delivers an event on a subscribed channel.
    ///
    /// Returns `Ok(0)` when nobody is subscribed to the channel.
    pub fn emit(&self, channel_name: &str, event: &str, payload: &Value) -> SyncResult<usize> {
        match self.channel(channel_name) {
            Some(channel) => channel.emit(event, payload),
            None => Ok(0),
        }
    }

    /// Returns true if the channel is currently subscribed.
    pub fn is_subscribed(&self, channel_name: &str) -> bool {
        self.channels.read().contains_key(channel_name)
    }

    /// Returns how many times `subscribe` was called.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent subscriptions fail.
    pub fn set_refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Returns true if a logger is installed.
    pub fn has_logger(&self) -> bool {
        self.logger.read().is_some()
    }

    fn log(&self, message: &str) {
        let logger = self.logger.read().clone();
        if let Some(logger) = logger {
            logger(message);
        }
    }
}

impl PushTransport for MemoryTransport {
    fn subscribe(&self, channel_name: &str) -> SyncResult<ChannelRef> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(SyncError::transport(format!(
                "subscription to {channel_name} refused"
            )));
        }

        let channel = {
            let mut channels = self.channels.write();
            let entry = channels
                .entry(channel_name.to_string())
                .or_insert_with(|| Arc::new(MemoryChannel::new(channel_name)));
            Arc::clone(entry)
        };
        let channel: ChannelRef = channel;
        self.log(&format!("subscribed to {channel_name}"));
        Ok(channel)
    }

    fn unsubscribe(&self, channel_name: &str) -> SyncResult<()> {
        let removed = self.channels.write().remove(channel_name);
        if let Some(channel) = removed {
            channel.mark_unsubscribed();
            self.log(&format!("unsubscribed from {channel_name}"));
        }
        Ok(())
    }

    fn set_logger(&self, logger: Option<TransportLogger>) {
        *self.logger.write() = logger;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_payload: &Value| -> SyncResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn subscribe_returns_same_channel() {
        let transport = MemoryTransport::new();
        let a = transport.subscribe("tasks").unwrap();
        let b = transport.subscribe("tasks").unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        a.bind("add_task", counting_handler(&counter));
        assert_eq!(transport.channel("tasks").unwrap().listener_count("add_task"), 1);
        assert_eq!(b.name(), "tasks");
        assert_eq!(transport.subscribe_calls(), 2);
    }

    #[test]
    fn unbind_by_identity() {
        let channel = MemoryChannel::new("tasks");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let id1 = channel.bind("add_task", counting_handler(&first));
        let _id2 = channel.bind("add_task", counting_handler(&second));

        assert!(channel.unbind("add_task", id1));
        assert!(!channel.unbind("add_task", id1));

        assert_eq!(channel.emit("add_task", &json!({})).unwrap(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unbind_requires_matching_event() {
        let channel = MemoryChannel::new("tasks");
        let counter = Arc::new(AtomicUsize::new(0));
        let id = channel.bind("add_task", counting_handler(&counter));
        assert!(!channel.unbind("remove_task", id));
        assert_eq!(channel.total_listeners(), 1);
    }

    #[test]
    fn handler_can_unbind_itself() {
        let channel = Arc::new(MemoryChannel::new("tasks"));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let handler: EventHandler = {
            let channel = Arc::clone(&channel);
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            Arc::new(move |_payload: &Value| -> SyncResult<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock() {
                    channel.unbind("add_task", id);
                }
                Ok(())
            })
        };
        *slot.lock() = Some(channel.bind("add_task", handler));

        channel.emit("add_task", &json!({})).unwrap();
        channel.emit("add_task", &json!({})).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_error_returned_after_all_handlers() {
        let channel = MemoryChannel::new("tasks");
        let counter = Arc::new(AtomicUsize::new(0));
        channel.bind(
            "add_task",
            Arc::new(|_payload: &Value| -> SyncResult<()> { Err(SyncError::store("boom")) }),
        );
        channel.bind("add_task", counting_handler(&counter));

        assert!(channel.emit("add_task", &json!({})).is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let transport = MemoryTransport::new();
        let counter = Arc::new(AtomicUsize::new(0));
        transport
            .subscribe("tasks")
            .unwrap()
            .bind("add_task", counting_handler(&counter));
        let channel = transport.channel("tasks").unwrap();

        transport.unsubscribe("tasks").unwrap();
        assert!(!transport.is_subscribed("tasks"));
        assert!(!channel.is_subscribed());
        assert_eq!(channel.emit("add_task", &json!({})).unwrap(), 0);
        assert_eq!(transport.emit("tasks", "add_task", &json!({})).unwrap(), 0);

        // Releasing twice is harmless.
        transport.unsubscribe("tasks").unwrap();
    }

    #[test]
    fn refused_subscription() {
        let transport = MemoryTransport::new();
        transport.set_refuse_subscriptions(true);
        assert!(matches!(
            transport.subscribe("tasks"),
            Err(SyncError::Transport { .. })
        ));
    }

    #[test]
    fn logger_receives_messages() {
        let transport = MemoryTransport::new();
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        transport.set_logger(Some(Arc::new(move |m: &str| sink.lock().push(m.to_string()))));

        transport.subscribe("private-tasks").unwrap();
        transport.unsubscribe("private-tasks").unwrap();

        assert_eq!(
            *lines.lock(),
            vec![
                "subscribed to private-tasks".to_string(),
                "unsubscribed from private-tasks".to_string()
            ]
        );

        transport.set_logger(None);
        assert!(!transport.has_logger());
    }
}
