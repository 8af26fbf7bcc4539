//! ALP line protocol.

use bytes::Bytes;

use super::{DecodeResult, Protocol};
use crate::protocol::wire_format::{keys, kind_tag, CARRIAGE_RETURN, PREFIX, TERMINATOR};
use crate::protocol::{Command, Event, ReplyStatus};

/// The ALP text protocol (`alp://...\n`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlpProtocol;

impl AlpProtocol {
    /// Registry name of this protocol.
    pub const NAME: &'static str = "ardulink2";

    /// Line body (between prefix and terminator) for a command.
    fn body(command: &Command) -> String {
        match command {
            Command::SwitchDigital { pin, value } => {
                format!("{}/{}/{}", keys::POWER_PIN_SWITCH, pin, u8::from(*value))
            }
            Command::SwitchAnalog { pin, value } => {
                format!("{}/{}/{}", keys::POWER_PIN_INTENSITY, pin, value)
            }
            Command::StartListening(pin) => format!(
                "{}{}/{}",
                keys::START_LISTENING,
                kind_tag(pin.kind()),
                pin.number()
            ),
            Command::StopListening(pin) => format!(
                "{}{}/{}",
                keys::STOP_LISTENING,
                kind_tag(pin.kind()),
                pin.number()
            ),
            Command::KeyPress {
                key,
                keycode,
                location,
                modifiers,
                modifiers_ex,
            } => format!(
                "{}/chr{}cod{}loc{}mod{}mex{}",
                keys::KEY_PRESS,
                key,
                keycode,
                location,
                modifiers,
                modifiers_ex
            ),
            Command::Custom(text) => format!("{}/{}", keys::CUSTOM, text),
        }
    }
}

impl Protocol for AlpProtocol {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode(&self, command: &Command) -> Bytes {
        let body = Self::body(command);
        let mut line = Vec::with_capacity(PREFIX.len() + body.len() + 1);
        line.extend_from_slice(PREFIX.as_bytes());
        line.extend_from_slice(body.as_bytes());
        line.push(TERMINATOR);
        Bytes::from(line)
    }

    fn decode(&self, buf: &[u8]) -> DecodeResult {
        let Some(end) = buf.iter().position(|&b| b == TERMINATOR) else {
            return DecodeResult::Incomplete;
        };
        let consumed = end + 1;

        let mut line = &buf[..end];
        if let Some((&CARRIAGE_RETURN, rest)) = line.split_last() {
            line = rest;
        }

        match parse_line(line) {
            Some(event) => DecodeResult::Complete(event, consumed),
            None => DecodeResult::Unparseable(consumed),
        }
    }
}

fn parse_line(line: &[u8]) -> Option<Event> {
    let line = std::str::from_utf8(line).ok()?;
    let message = line.strip_prefix(PREFIX)?;
    let (key, rest) = message.split_once('/')?;

    match key {
        keys::ANALOG_READ => {
            let (pin, value) = rest.split_once('/')?;
            Some(Event::AnalogPinValueChanged {
                pin: parse_decimal(pin)?,
                value: parse_decimal(value)?,
            })
        }
        keys::DIGITAL_READ => {
            let (pin, value) = rest.split_once('/')?;
            let value = match value {
                "0" => false,
                "1" => true,
                _ => return None,
            };
            Some(Event::DigitalPinValueChanged {
                pin: parse_decimal(pin)?,
                value,
            })
        }
        keys::REPLY => parse_reply(rest),
        _ => None,
    }
}

/// `ok?id=42&key=value`
fn parse_reply(rest: &str) -> Option<Event> {
    let (status, params) = rest.split_once('?')?;
    let status = match status {
        "ok" => ReplyStatus::Ok,
        "ko" => ReplyStatus::Ko,
        _ => return None,
    };
    let id = params
        .split('&')
        .find_map(|param| param.strip_prefix("id="))
        .and_then(parse_decimal::<u64>)?;
    Some(Event::ReplyReceived { id, status })
}

/// Plain decimal digits only; signs, blanks and overflow are rejected.
fn parse_decimal<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
