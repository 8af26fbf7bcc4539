//! Topic namespace and payload parsing.
//!
//! Every managed pin has one topic, `{base}D{pin}` or `{base}A{pin}`, used
//! for both commands from the bus and events published to it.

use crate::protocol::{Pin, PinKind};

/// Base topic of the deployed namespace.
pub const DEFAULT_BASE_TOPIC: &str = "home/devices/ardulink/";

const DIGITAL_LETTER: char = 'D';
const ANALOG_LETTER: char = 'A';

/// Mapping between topic strings and pins.
///
/// # Example
///
/// ```
/// use alplink::bridge::Topics;
/// use alplink::protocol::Pin;
///
/// let topics = Topics::default();
/// assert_eq!(topics.topic_for(Pin::digital(3)), "home/devices/ardulink/D3");
/// assert_eq!(topics.parse("home/devices/ardulink/A5"), Some(Pin::analog(5)));
/// assert_eq!(topics.parse("home/devices/ardulink/X5"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    /// Create a namespace below `base`. A missing trailing `/` is added.
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.is_empty() && !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }

    /// The base prefix, always ending in `/` unless empty.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Topic of a pin.
    pub fn topic_for(&self, pin: Pin) -> String {
        let letter = match pin.kind() {
            PinKind::Digital => DIGITAL_LETTER,
            PinKind::Analog => ANALOG_LETTER,
        };
        format!("{}{}{}", self.base, letter, pin.number())
    }

    /// Pin addressed by a topic, `None` for anything outside the namespace.
    pub fn parse(&self, topic: &str) -> Option<Pin> {
        let rest = topic.strip_prefix(self.base.as_str())?;
        let mut chars = rest.chars();
        let kind = match chars.next()? {
            DIGITAL_LETTER => PinKind::Digital,
            ANALOG_LETTER => PinKind::Analog,
            _ => return None,
        };

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = digits.parse::<u32>().ok()?;

        Some(match kind {
            PinKind::Digital => Pin::digital(number),
            PinKind::Analog => Pin::analog(number),
        })
    }

    /// Bus pattern covering the whole namespace.
    pub fn subscription_pattern(&self) -> String {
        format!("{}#", self.base)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TOPIC)
    }
}

/// Permissive boolean: `true` (any case) or `1`; everything else is false.
pub fn parse_lenient_bool(payload: &[u8]) -> bool {
    payload.eq_ignore_ascii_case(b"true") || payload == b"1"
}

/// Decimal analog value in `0..=255`, `None` otherwise.
pub fn parse_analog_value(payload: &[u8]) -> Option<u8> {
    if payload.is_empty() || !payload.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(payload).ok()?.parse().ok()
}
