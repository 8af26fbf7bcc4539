//! Commands sent to the device and events received from it.

use crate::error::{LinkError, Result};

use super::pin::{Pin, PinKind};
use super::wire_format::TERMINATOR;

/// An outgoing command. Consumed once by a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch a digital pin on or off.
    SwitchDigital { pin: u32, value: bool },
    /// Set an analog (PWM) pin.
    SwitchAnalog { pin: u32, value: u8 },
    /// Ask the device to start reporting changes of a pin.
    StartListening(Pin),
    /// Ask the device to stop reporting changes of a pin.
    StopListening(Pin),
    /// Forward a key press.
    KeyPress {
        key: char,
        keycode: i32,
        location: i32,
        modifiers: i32,
        modifiers_ex: i32,
    },
    /// Raw custom message, sent after the `cust/` key.
    Custom(String),
}

impl Command {
    /// Check that the command can be rendered as a single line.
    pub fn validate(&self) -> Result<()> {
        let terminator = char::from(TERMINATOR);
        match self {
            Command::KeyPress { key, .. } if *key == terminator || *key == '\r' => Err(
                LinkError::invalid("Key press character cannot be a line terminator"),
            ),
            Command::Custom(text) if text.contains(terminator) || text.contains('\r') => Err(
                LinkError::invalid("Custom message cannot contain a line terminator"),
            ),
            _ => Ok(()),
        }
    }
}

/// Outcome reported by a reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Ko,
}

/// An inbound event, produced only by the decode loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DigitalPinValueChanged { pin: u32, value: bool },
    AnalogPinValueChanged { pin: u32, value: u8 },
    ReplyReceived { id: u64, status: ReplyStatus },
}

impl Event {
    /// The pin this event is about, if any.
    pub fn pin(&self) -> Option<Pin> {
        match *self {
            Event::DigitalPinValueChanged { pin, .. } => Some(Pin::digital(pin)),
            Event::AnalogPinValueChanged { pin, .. } => Some(Pin::analog(pin)),
            Event::ReplyReceived { .. } => None,
        }
    }

    /// The pin kind this event is about, if any.
    #[inline]
    pub fn kind(&self) -> Option<PinKind> {
        self.pin().map(|p| p.kind())
    }
}
