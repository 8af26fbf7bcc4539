//! Protocol module - pins, messages, wire constants and line framing.
//!
//! - [`Pin`] / [`PinKind`] - pin addressing
//! - [`Command`] / [`Event`] - outbound and inbound messages
//! - [`wire_format`] - ALP prefix, terminator and message keys
//! - [`LineBuffer`] - accumulates partial reads and decodes complete lines

mod line_buffer;
mod message;
mod pin;
pub mod wire_format;

pub use line_buffer::LineBuffer;
pub use message::{Command, Event, ReplyStatus};
pub use pin::{Pin, PinKind};
pub use wire_format::{PREFIX, TERMINATOR};
