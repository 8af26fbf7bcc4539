//! ALP wire format constants.
//!
//! Every message is a single text line:
//! ```text
//! alp://<key>/<field>[/<field>...]\n
//! ```
//!
//! Numbers are rendered as decimal ASCII. Start/stop listening commands
//! append a 2-letter pin kind tag to the verb (`srla`, `spld`, ...).

use super::pin::PinKind;

/// Prefix of every ALP line.
pub const PREFIX: &str = "alp://";

/// Line terminator.
pub const TERMINATOR: u8 = b'\n';

/// Tolerated before the terminator on inbound lines.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Default upper bound for a single inbound line (without terminator).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Message keys.
pub mod keys {
    /// Switch a digital pin: `ppsw/{pin}/{0|1}`.
    pub const POWER_PIN_SWITCH: &str = "ppsw";
    /// Set an analog (PWM) pin: `ppin/{pin}/{value}`.
    pub const POWER_PIN_INTENSITY: &str = "ppin";
    /// Start listening verb, followed by a kind tag.
    pub const START_LISTENING: &str = "sr";
    /// Stop listening verb, followed by a kind tag.
    pub const STOP_LISTENING: &str = "sp";
    /// Key press: `kprs/chr{c}cod{n}loc{n}mod{n}mex{n}`.
    pub const KEY_PRESS: &str = "kprs";
    /// Free-form custom message.
    pub const CUSTOM: &str = "cust";
    /// Analog pin read (inbound).
    pub const ANALOG_READ: &str = "ared";
    /// Digital pin read (inbound).
    pub const DIGITAL_READ: &str = "dred";
    /// Reply to a command carrying an id (inbound).
    pub const REPLY: &str = "rply";
}

/// 2-letter tag identifying the pin kind in listening commands.
#[inline]
pub fn kind_tag(kind: PinKind) -> &'static str {
    match kind {
        PinKind::Analog => "la",
        PinKind::Digital => "ld",
    }
}
