//! Link - one transport, one protocol, a decode loop and a listener registry.
//!
//! A [`Link`] owns its transport exclusively. The read half is driven by a
//! background decode loop that turns bytes into [`Event`]s and dispatches
//! them to registered [`Subscription`]s. The write half belongs to the
//! writer task; [`Link::send`] returns once the encoded line was written.
//!
//! # Dispatch model
//!
//! Events are dispatched synchronously inside the decode loop, in decode
//! order. A slow callback therefore delays delivery of that event to later
//! subscribers and the decoding of further bytes by its own runtime.
//! Callbacks must be quick and must not block.
//!
//! # Listening handshake
//!
//! For every pin, the first filtered subscription makes the link send
//! `StartListening` and the removal of the last one sends `StopListening`.
//! Unfiltered subscriptions never trigger a handshake.
//!
//! # Example
//!
//! ```ignore
//! use alplink::link::{Link, Subscription};
//! use alplink::protocol::PinKind;
//!
//! let stream = alplink::transport::connect_tcp("192.168.1.20:4478").await?;
//! let link = Link::open(stream)?;
//!
//! let handle = link
//!     .register(Subscription::for_pin(PinKind::Analog, 3, |event| {
//!         println!("{:?}", event);
//!         Ok(())
//!     }))
//!     .await?;
//!
//! link.switch_digital_pin(13, true).await?;
//! link.unregister(handle).await?;
//! link.close().await?;
//! ```

mod registry;
mod subscription;

pub use subscription::{ListenerResult, Subscription, SubscriptionHandle};

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::{Protocol, ProtocolRegistry, DEFAULT_PROTOCOL};
use crate::error::{LinkError, Result};
use crate::protocol::wire_format::DEFAULT_MAX_LINE_LENGTH;
use crate::protocol::{Command, Event, LineBuffer};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};
use registry::{ListenerRegistry, Target};

/// Default size of the transport read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Decode loop running, commands accepted.
    Open,
    /// The transport reached end of stream or failed to read.
    Lost,
    /// `close()` was called.
    Closed,
}

/// Link settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Name of the protocol to pick from the registry.
    pub protocol: String,
    /// Size of a single transport read.
    pub read_buffer_size: usize,
    /// Capacity of the writer queue.
    pub channel_capacity: usize,
    /// Longest inbound line before it is dropped as noise.
    pub max_line_length: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Builder for configuring and opening a [`Link`].
pub struct LinkBuilder {
    config: LinkConfig,
    protocols: ProtocolRegistry,
}

impl LinkBuilder {
    /// Create a builder with default settings and the default protocol table.
    pub fn new() -> Self {
        Self {
            config: LinkConfig::default(),
            protocols: ProtocolRegistry::default(),
        }
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Pick the protocol by name.
    pub fn protocol_name(mut self, name: impl Into<String>) -> Self {
        self.config.protocol = name.into();
        self
    }

    /// Use a custom protocol table.
    pub fn protocols(mut self, protocols: ProtocolRegistry) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the transport read buffer size.
    ///
    /// Default: 4096
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum inbound line length.
    ///
    /// Default: 1024
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Open a link over `transport`.
    ///
    /// Spawns the decode loop and the writer task, so this must be called
    /// from within a tokio runtime.
    pub fn open<T: Transport>(self, transport: T) -> Result<Link> {
        let protocol = self.protocols.get(&self.config.protocol)?;
        let (read_half, write_half) = tokio::io::split(transport);
        let (state, state_rx) = watch::channel(LinkState::Open);
        let state = Arc::new(state);

        let (writer, writer_task) = spawn_writer_task(
            write_half,
            WriterConfig {
                channel_capacity: self.config.channel_capacity,
            },
            state.clone(),
        );

        let shared = Arc::new(Shared {
            protocol: protocol.clone(),
            writer,
            registry: ListenerRegistry::new(),
            state,
            tasks: Mutex::new(Tasks {
                reader: None,
                writer: Some(writer_task),
            }),
        });

        let reader_task = tokio::spawn(read_loop(
            read_half,
            Arc::downgrade(&shared),
            protocol,
            state_rx,
            self.config.read_buffer_size.max(1),
            self.config.max_line_length,
        ));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reader = Some(reader_task);

        tracing::debug!("Link opened using protocol {}", self.config.protocol);
        Ok(Link { shared })
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Tasks {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<Result<()>>>,
}

struct Shared {
    protocol: Arc<dyn Protocol>,
    writer: WriterHandle,
    registry: ListenerRegistry,
    state: Arc<watch::Sender<LinkState>>,
    tasks: Mutex<Tasks>,
}

/// Move a link from open to lost. Closed links stay closed.
pub(crate) fn mark_lost(state: &watch::Sender<LinkState>) {
    state.send_if_modified(|state| {
        if *state == LinkState::Open {
            *state = LinkState::Lost;
            true
        } else {
            false
        }
    });
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Stops both background tasks when the last handle goes away.
        self.state.send_replace(LinkState::Closed);
    }
}

/// A running link to a device.
///
/// Cheaply cloneable; all clones share the same transport and registry.
#[derive(Clone)]
pub struct Link {
    shared: Arc<Shared>,
}

impl Link {
    /// Create a new link builder.
    pub fn builder() -> LinkBuilder {
        LinkBuilder::new()
    }

    /// Open a link with default settings.
    pub fn open<T: Transport>(transport: T) -> Result<Link> {
        LinkBuilder::new().open(transport)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        *self.shared.state.borrow()
    }

    /// Name of the protocol in use.
    pub fn protocol_name(&self) -> &str {
        self.shared.protocol.name()
    }

    /// Number of registered subscriptions (pin and reply listeners).
    pub fn subscription_count(&self) -> usize {
        self.shared.registry.len()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            LinkState::Open => Ok(()),
            LinkState::Lost | LinkState::Closed => Err(LinkError::ConnectionClosed),
        }
    }

    /// Encode and write a command.
    ///
    /// Returns once the line was handed to the transport. Concurrent calls
    /// are written one after another, in the order they were queued.
    pub async fn send(&self, command: Command) -> Result<()> {
        command.validate()?;
        self.ensure_open()?;

        let line = self.shared.protocol.encode(&command);
        tracing::debug!("Sending {:?}", command);
        self.shared.writer.send(line).await
    }

    /// Switch a digital pin on or off.
    pub async fn switch_digital_pin(&self, pin: u32, value: bool) -> Result<()> {
        self.send(Command::SwitchDigital { pin, value }).await
    }

    /// Set an analog pin.
    pub async fn switch_analog_pin(&self, pin: u32, value: u8) -> Result<()> {
        self.send(Command::SwitchAnalog { pin, value }).await
    }

    /// Forward a key press to the device.
    pub async fn send_key_press(
        &self,
        key: char,
        keycode: i32,
        location: i32,
        modifiers: i32,
        modifiers_ex: i32,
    ) -> Result<()> {
        self.send(Command::KeyPress {
            key,
            keycode,
            location,
            modifiers,
            modifiers_ex,
        })
        .await
    }

    /// Send a free-form custom message.
    pub async fn send_custom(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::Custom(message.into())).await
    }

    /// Register a pin subscription.
    ///
    /// Fails with [`LinkError::InvalidArgument`] for a negative pin filter,
    /// before any I/O. The first subscription for a pin sends
    /// `StartListening` before this returns.
    pub async fn register(&self, subscription: Subscription) -> Result<SubscriptionHandle> {
        let filter = subscription.pin_filter()?;
        self.ensure_open()?;

        let target = Target::Pins {
            kind: subscription.kind(),
            pin: filter,
        };
        let callback = subscription.into_callback();

        let Some(pin) = filter else {
            return Ok(self.shared.registry.insert(target, callback));
        };

        let mut counts = self.shared.registry.counts().lock().await;
        let current = counts.get(&pin).copied().unwrap_or(0);

        // In place before the handshake: the device may answer with the
        // current value right away.
        let handle = self.shared.registry.insert(target, callback);
        if current == 0 {
            tracing::debug!("First listener for {}, starting", pin);
            if let Err(e) = self.send(Command::StartListening(pin)).await {
                self.shared.registry.remove(handle);
                return Err(e);
            }
        }
        counts.insert(pin, current + 1);

        Ok(handle)
    }

    /// Register a listener for reply events. Replies never trigger a handshake.
    pub fn register_reply_listener<F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self
            .shared
            .registry
            .insert(Target::Replies, Arc::new(callback)))
    }

    /// Remove a subscription.
    ///
    /// Removing the last subscription for a pin sends `StopListening`,
    /// unless the link is no longer open. Unknown handles fail with
    /// [`LinkError::InvalidArgument`].
    pub async fn unregister(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut counts = self.shared.registry.counts().lock().await;

        let target = self.shared.registry.remove(handle).ok_or_else(|| {
            LinkError::invalid(format!("Unknown subscription handle {:?}", handle))
        })?;

        let Target::Pins { pin: Some(pin), .. } = target else {
            return Ok(());
        };

        let remaining = match counts.get_mut(&pin) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return Ok(());
        }
        counts.remove(&pin);

        if self.state() != LinkState::Open {
            tracing::debug!("Last listener for {} removed on a closed link", pin);
            return Ok(());
        }
        tracing::debug!("Last listener for {} removed, stopping", pin);
        self.send(Command::StopListening(pin)).await
    }

    /// Remove every subscription, stopping all pins still listened to.
    ///
    /// Keeps going after a failure and returns the first one.
    pub async fn unregister_all(&self) -> Result<()> {
        let mut result = Ok(());
        for handle in self.shared.registry.handles() {
            match self.unregister(handle).await {
                Ok(()) | Err(LinkError::InvalidArgument(_)) => {}
                Err(e) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    /// Wait until the link is no longer open (closed or transport lost).
    pub async fn wait_closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s != LinkState::Open).await;
    }

    /// Stop the decode loop and the writer, releasing the transport.
    ///
    /// In-flight sends fail with [`LinkError::ConnectionClosed`]. Closing a
    /// link twice fails with [`LinkError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        let previous = self.shared.state.send_replace(LinkState::Closed);
        if previous == LinkState::Closed {
            return Err(LinkError::AlreadyClosed);
        }

        let (reader, writer) = {
            let mut tasks = self
                .shared
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (tasks.reader.take(), tasks.writer.take())
        };

        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                tracing::error!("Decode loop ended abnormally: {}", e);
            }
        }
        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Writer had failed before close: {}", e),
                Err(e) => tracing::error!("Writer task ended abnormally: {}", e),
            }
        }

        tracing::debug!("Link closed");
        Ok(())
    }
}

/// Decode loop - reads transport bytes and dispatches decoded events.
async fn read_loop<R>(
    mut reader: R,
    shared: Weak<Shared>,
    protocol: Arc<dyn Protocol>,
    mut state: watch::Receiver<LinkState>,
    read_buffer_size: usize,
    max_line_length: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = LineBuffer::with_max_line_length(max_line_length);
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        let read = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s != LinkState::Open) => return,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                tracing::debug!("Transport reached end of stream");
                if let Some(link) = shared.upgrade() {
                    mark_lost(&link.state);
                }
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Transport read failed: {}", e);
                if let Some(link) = shared.upgrade() {
                    mark_lost(&link.state);
                }
                return;
            }
        };

        let Some(link) = shared.upgrade() else {
            return;
        };
        for event in lines.push(&buf[..n], protocol.as_ref()) {
            tracing::debug!("Received {:?}", event);
            link.registry.dispatch(&event);
        }
    }
}
