//! Bridge - exposes a link on a publish/subscribe bus.
//!
//! Pin events of observed pins are published to the pin's topic; messages
//! arriving on a pin topic are turned into switch commands. Pins start
//! unobserved and are only published after an explicit enable call.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use alplink::bridge::{Bridge, BridgeConfig, MemoryBus};
//!
//! let bus = Arc::new(MemoryBus::new());
//! let bridge = Bridge::new(link, bus.clone(), BridgeConfig::default());
//! bridge.start()?;
//! bridge.enable_digital_pin_change_events(2).await?;
//!
//! // Switches digital pin 13 on.
//! bus.deliver("home/devices/ardulink/D13", b"true");
//! ```

mod bus;
mod topic;

pub use bus::{topic_matches, BusClient, BusError, BusMessage, MemoryBus, MessageHandler};
pub use topic::{parse_analog_value, parse_lenient_bool, Topics, DEFAULT_BASE_TOPIC};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::link::{Link, ListenerResult, Subscription, SubscriptionHandle};
use crate::protocol::{Event, Pin, PinKind};

/// Bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Prefix of every pin topic.
    pub base_topic: String,
    /// Analog changes up to this distance from the last published value are
    /// not republished.
    pub analog_tolerance: u8,
    /// Inbound bus messages waiting for the link. Messages beyond this are
    /// dropped with a warning.
    pub forward_capacity: usize,
}

/// Default capacity of the inbound forwarding queue.
pub const DEFAULT_FORWARD_CAPACITY: usize = 256;

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
            analog_tolerance: 0,
            forward_capacity: DEFAULT_FORWARD_CAPACITY,
        }
    }
}

/// Last published analog values, per pin.
struct AnalogFilter {
    default_tolerance: u8,
    overrides: HashMap<u32, u8>,
    last: HashMap<u32, u8>,
}

impl AnalogFilter {
    fn new(default_tolerance: u8) -> Self {
        Self {
            default_tolerance,
            overrides: HashMap::new(),
            last: HashMap::new(),
        }
    }

    fn should_publish(&mut self, pin: u32, value: u8) -> bool {
        let tolerance = self
            .overrides
            .get(&pin)
            .copied()
            .unwrap_or(self.default_tolerance);

        match self.last.get(&pin) {
            Some(&previous) if previous.abs_diff(value) <= tolerance => false,
            _ => {
                self.last.insert(pin, value);
                true
            }
        }
    }
}

struct BridgeShared {
    link: Link,
    bus: Arc<dyn BusClient>,
    topics: Topics,
    observed: tokio::sync::Mutex<HashMap<Pin, SubscriptionHandle>>,
    analog: Arc<Mutex<AnalogFilter>>,
    /// Queue the bus handler feeds while started, `None` while stopped.
    inbound: Arc<Mutex<Option<mpsc::Sender<BusMessage>>>>,
    forwarding: Mutex<Forwarding>,
    forward_capacity: usize,
}

#[derive(Default)]
struct Forwarding {
    task: Option<JoinHandle<()>>,
    subscribed: bool,
}

impl Drop for BridgeShared {
    fn drop(&mut self) {
        let forwarding = self
            .forwarding
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = forwarding.task.take() {
            task.abort();
        }
    }
}

/// Bus handler body: queue a message for the forwarder, if one is running.
fn queue_inbound(inbound: &Mutex<Option<mpsc::Sender<BusMessage>>>, topic: &str, payload: &[u8]) {
    let inbound = inbound.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(tx) = inbound.as_ref() else {
        return;
    };
    match tx.try_send(BusMessage::new(topic, payload)) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(message)) => {
            tracing::warn!("Forwarding queue full, dropping message on {}", message.topic);
        }
    }
}

/// Translator between a bus and a link.
///
/// Cheaply cloneable; clones share observed pins and the forwarding task.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeShared>,
}

impl Bridge {
    pub fn new(link: Link, bus: Arc<dyn BusClient>, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeShared {
                link,
                bus,
                topics: Topics::new(config.base_topic),
                observed: tokio::sync::Mutex::new(HashMap::new()),
                analog: Arc::new(Mutex::new(AnalogFilter::new(config.analog_tolerance))),
                inbound: Arc::new(Mutex::new(None)),
                forwarding: Mutex::new(Forwarding::default()),
                forward_capacity: config.forward_capacity.max(1),
            }),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.inner.topics
    }

    pub fn link(&self) -> &Link {
        &self.inner.link
    }

    /// Publish changes of a digital pin. No-op if already observed.
    pub async fn enable_digital_pin_change_events(&self, pin: i64) -> Result<()> {
        self.enable(PinKind::Digital, pin).await
    }

    /// Publish changes of an analog pin. No-op if already observed.
    pub async fn enable_analog_pin_change_events(&self, pin: i64) -> Result<()> {
        self.enable(PinKind::Analog, pin).await
    }

    /// Stop publishing a digital pin. No-op if not observed.
    pub async fn disable_digital_pin_change_events(&self, pin: i64) -> Result<()> {
        self.disable(PinKind::Digital, pin).await
    }

    /// Stop publishing an analog pin. No-op if not observed.
    pub async fn disable_analog_pin_change_events(&self, pin: i64) -> Result<()> {
        self.disable(PinKind::Analog, pin).await
    }

    /// Set the analog change tolerance of one pin.
    pub fn configure_analog_tolerance(&self, pin: i64, tolerance: u8) -> Result<()> {
        let pin = Pin::new(PinKind::Analog, pin)?;
        self.inner
            .analog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .overrides
            .insert(pin.number(), tolerance);
        Ok(())
    }

    /// Pins currently published, sorted.
    pub async fn observed_pins(&self) -> Vec<Pin> {
        let mut pins: Vec<Pin> = self.inner.observed.lock().await.keys().copied().collect();
        pins.sort();
        pins
    }

    async fn enable(&self, kind: PinKind, pin: i64) -> Result<()> {
        let pin = Pin::new(kind, pin)?;
        let mut observed = self.inner.observed.lock().await;
        if observed.contains_key(&pin) {
            return Ok(());
        }

        let subscription = Subscription::for_pin(kind, i64::from(pin.number()), self.publisher(pin));
        let handle = self.inner.link.register(subscription).await?;
        observed.insert(pin, handle);

        tracing::debug!("Publishing changes of {} on {}", pin, self.inner.topics.topic_for(pin));
        Ok(())
    }

    async fn disable(&self, kind: PinKind, pin: i64) -> Result<()> {
        let pin = Pin::new(kind, pin)?;
        let mut observed = self.inner.observed.lock().await;
        let Some(handle) = observed.remove(&pin) else {
            return Ok(());
        };

        if kind == PinKind::Analog {
            self.forget_analog(pin.number());
        }
        tracing::debug!("No longer publishing changes of {}", pin);
        self.inner.link.unregister(handle).await
    }

    fn forget_analog(&self, pin: u32) {
        self.inner
            .analog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .remove(&pin);
    }

    /// Listener that publishes events of `pin`.
    ///
    /// Captures only the bus and the filter; the link owns its listeners, so
    /// holding the bridge here would keep both alive forever.
    fn publisher(&self, pin: Pin) -> impl Fn(&Event) -> ListenerResult + Send + Sync + 'static {
        let bus = self.inner.bus.clone();
        let analog = self.inner.analog.clone();
        let topic = self.inner.topics.topic_for(pin);

        move |event: &Event| {
            let payload = match *event {
                Event::DigitalPinValueChanged { value, .. } => {
                    String::from(if value { "1" } else { "0" })
                }
                Event::AnalogPinValueChanged { pin, value } => {
                    let mut filter = analog.lock().unwrap_or_else(PoisonError::into_inner);
                    if !filter.should_publish(pin, value) {
                        return Ok(());
                    }
                    value.to_string()
                }
                Event::ReplyReceived { .. } => return Ok(()),
            };

            bus.publish(&topic, payload.as_bytes())?;
            Ok(())
        }
    }

    /// Handle a message from the bus.
    ///
    /// Topics outside the namespace and analog payloads that are not a value
    /// in `0..=255` are dropped and return `Ok`. Digital payloads other than
    /// `true`/`1` switch the pin off.
    pub async fn from_bus(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let Some(pin) = self.inner.topics.parse(topic) else {
            tracing::debug!("Ignoring message on {}", topic);
            return Ok(());
        };

        match pin.kind() {
            PinKind::Digital => {
                let value = parse_lenient_bool(payload);
                self.inner.link.switch_digital_pin(pin.number(), value).await
            }
            PinKind::Analog => match parse_analog_value(payload) {
                Some(value) => self.inner.link.switch_analog_pin(pin.number(), value).await,
                None => {
                    tracing::warn!(
                        "Dropping analog payload {:?} on {}",
                        String::from_utf8_lossy(payload),
                        topic
                    );
                    Ok(())
                }
            },
        }
    }

    /// Forward messages from the namespace to the link.
    ///
    /// Messages are handled one at a time, in arrival order. The bus
    /// subscription is made by the first `start` and kept for the lifetime of
    /// the bridge; `stop` only detaches it. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut forwarding = self
            .inner
            .forwarding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if forwarding.task.is_some() {
            return Err(LinkError::invalid("Bridge already started"));
        }

        let pattern = self.inner.topics.subscription_pattern();
        if !forwarding.subscribed {
            let inbound = self.inner.inbound.clone();
            self.inner.bus.subscribe(
                &pattern,
                Box::new(move |topic: &str, payload: &[u8]| {
                    queue_inbound(&inbound, topic, payload);
                }),
            )?;
            forwarding.subscribed = true;
            tracing::debug!("Bridge subscribed to {}", pattern);
        }

        let (tx, mut rx) = mpsc::channel::<BusMessage>(self.inner.forward_capacity);
        *self
            .inner
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let bridge = Arc::downgrade(&self.inner);
        forwarding.task = Some(tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(inner) = bridge.upgrade() else {
                    break;
                };
                let bridge = Bridge { inner };
                if let Err(e) = bridge.from_bus(&message.topic, &message.payload).await {
                    tracing::error!("Failed to forward message on {}: {}", message.topic, e);
                }
            }
        }));

        tracing::debug!("Bridge forwarding {}", pattern);
        Ok(())
    }

    /// Stop forwarding and unobserve every pin.
    ///
    /// Messages still queued are discarded. Keeps going after a failure and
    /// returns the first one.
    pub async fn stop(&self) -> Result<()> {
        self.inner
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let task = self
            .inner
            .forwarding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let mut observed = self.inner.observed.lock().await;
        let mut result = Ok(());
        for (pin, handle) in observed.drain() {
            if pin.kind() == PinKind::Analog {
                self.forget_analog(pin.number());
            }
            if let Err(e) = self.inner.link.unregister(handle).await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
