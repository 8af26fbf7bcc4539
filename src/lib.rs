//! # alplink
//!
//! Async link to microcontrollers speaking the ALP line protocol
//! (`alp://ppsw/13/1\n`), plus a bridge exposing the link on a
//! publish/subscribe bus.
//!
//! ## Architecture
//!
//! - **Codec** (`codec`): pure encode/decode between commands, events and wire lines
//! - **Link** (`link`): owns the transport, runs the decode loop, serialises
//!   writes and keeps the reference-counted listener registry
//! - **Bridge** (`bridge`): maps pin topics to commands and pin events to topics
//!
//! ## Example
//!
//! ```ignore
//! use alplink::{Link, PinKind, Subscription};
//!
//! #[tokio::main]
//! async fn main() -> alplink::Result<()> {
//!     let stream = alplink::transport::connect_tcp("127.0.0.1:4478").await?;
//!     let link = Link::open(stream)?;
//!
//!     link.register(Subscription::for_pin(PinKind::Digital, 2, |event| {
//!         println!("{:?}", event);
//!         Ok(())
//!     }))
//!     .await?;
//!
//!     link.switch_digital_pin(13, true).await?;
//!     link.wait_closed().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod codec;
pub mod error;
pub mod link;
pub mod protocol;
pub mod transport;

mod writer;

pub use bridge::{Bridge, BridgeConfig, BusClient, MemoryBus};
pub use error::{LinkError, Result};
pub use link::{Link, LinkBuilder, LinkConfig, LinkState, Subscription, SubscriptionHandle};
pub use protocol::{Command, Event, Pin, PinKind};
