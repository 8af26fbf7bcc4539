//! Codec module - wire encoding/decoding of commands and events.
//!
//! This module provides:
//!
//! - [`Protocol`] - the codec contract: total `encode`, resynchronizing `decode`
//! - [`AlpProtocol`] - the ALP text line protocol
//! - [`ProtocolRegistry`] - explicit name → protocol table handed to a link
//!
//! # Example
//!
//! ```
//! use alplink::codec::{AlpProtocol, DecodeResult, Protocol};
//! use alplink::protocol::{Command, Event};
//!
//! let proto = AlpProtocol;
//! let line = proto.encode(&Command::SwitchAnalog { pin: 3, value: 127 });
//! assert_eq!(&line[..], b"alp://ppin/3/127\n");
//!
//! match proto.decode(b"alp://dred/7/1\n") {
//!     DecodeResult::Complete(event, consumed) => {
//!         assert_eq!(event, Event::DigitalPinValueChanged { pin: 7, value: true });
//!         assert_eq!(consumed, 15);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

mod alp;
mod registry;

pub use alp::AlpProtocol;
pub use registry::{ProtocolRegistry, DEFAULT_PROTOCOL};

use bytes::Bytes;

use crate::protocol::{Command, Event};

/// Result of decoding the head of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A full line decoded into an event; `usize` bytes were consumed.
    Complete(Event, usize),
    /// No terminator yet, more bytes are needed.
    Incomplete,
    /// A full line was present but matched no message shape.
    /// The `usize` bytes of that line must be skipped.
    Unparseable(usize),
}

/// A wire protocol spoken over a link.
///
/// Implementations are stateless; all buffering lives in the caller.
pub trait Protocol: Send + Sync + 'static {
    /// Name used to pick the protocol from a [`ProtocolRegistry`].
    fn name(&self) -> &str;

    /// Render a command as exactly one terminated line.
    fn encode(&self, command: &Command) -> Bytes;

    /// Decode the first line found at the start of `buf`.
    fn decode(&self, buf: &[u8]) -> DecodeResult;
}
