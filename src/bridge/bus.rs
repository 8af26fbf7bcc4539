//! Pub/sub client seam and an in-process bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::error::LinkError;

/// Callback invoked for each message matching a subscription.
pub type MessageHandler = Box<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Failure reported by a bus client.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to {pattern} failed: {reason}")]
    Subscribe { pattern: String, reason: String },

    #[error("Bus disconnected")]
    Disconnected,
}

impl From<BusError> for LinkError {
    fn from(e: BusError) -> Self {
        LinkError::Bus(e.to_string())
    }
}

/// A publish/subscribe client.
///
/// `publish` must not block: it is called from the link's decode loop.
/// Clients backed by a network queue the message and return.
pub trait BusClient: Send + Sync + 'static {
    /// Publish a payload on a topic.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Call `handler` for every message whose topic matches `pattern`.
    /// Patterns use MQTT wildcards: `+` for one level, `#` for the rest.
    fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<(), BusError>;
}

/// A message seen on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

type SharedHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// In-process bus.
///
/// Published messages are recorded, not looped back to subscribers, since
/// events and commands share topics. Inbound traffic is injected with
/// [`MemoryBus::deliver`].
///
/// # Example
///
/// ```
/// use alplink::bridge::{BusClient, MemoryBus};
///
/// let bus = MemoryBus::new();
/// bus.subscribe("home/+/lamp", Box::new(|topic: &str, payload: &[u8]| {
///     println!("{} -> {:?}", topic, payload);
/// })).unwrap();
///
/// assert_eq!(bus.deliver("home/kitchen/lamp", b"1"), 1);
/// assert_eq!(bus.deliver("home/kitchen/fan", b"1"), 0);
/// ```
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<BusMessage>>,
    subscribers: Mutex<Vec<(String, SharedHandler)>>,
    offline: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an inbound message to every matching subscriber.
    ///
    /// Returns the number of handlers called.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        let handlers: Vec<SharedHandler> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, topic))
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }

    /// Messages published so far, oldest first.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take and clear the published messages.
    pub fn take_published(&self) -> Vec<BusMessage> {
        std::mem::take(&mut *self.published.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Patterns subscribed so far.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    /// While offline, publish and subscribe fail with [`BusError::Disconnected`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        Ok(())
    }
}

impl BusClient for MemoryBus {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        self.ensure_online()?;
        tracing::debug!("Publishing {} bytes on {}", payload.len(), topic);
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BusMessage::new(topic, payload));
        Ok(())
    }

    fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<(), BusError> {
        self.ensure_online()?;
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pattern.to_string(), Arc::from(handler)));
        Ok(())
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
