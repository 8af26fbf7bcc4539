//! Pin addressing.

use std::fmt;

use crate::error::{LinkError, Result};

/// Kind of a hardware pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinKind {
    /// Analog pin, values 0..=255.
    Analog,
    /// Digital pin, boolean values.
    Digital,
}

/// An addressable pin. Identity is `(kind, number)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin {
    kind: PinKind,
    number: u32,
}

impl Pin {
    /// Analog pin with the given number.
    pub const fn analog(number: u32) -> Self {
        Self {
            kind: PinKind::Analog,
            number,
        }
    }

    /// Digital pin with the given number.
    pub const fn digital(number: u32) -> Self {
        Self {
            kind: PinKind::Digital,
            number,
        }
    }

    /// Build a pin from an unchecked number.
    ///
    /// Fails with [`LinkError::InvalidArgument`] for negative numbers or
    /// numbers that do not fit a pin address.
    ///
    /// ```
    /// use alplink::protocol::{Pin, PinKind};
    ///
    /// assert_eq!(Pin::new(PinKind::Digital, 13).unwrap(), Pin::digital(13));
    /// assert!(Pin::new(PinKind::Analog, -1).is_err());
    /// ```
    pub fn new(kind: PinKind, number: i64) -> Result<Self> {
        if number < 0 {
            return Err(LinkError::invalid(format!(
                "Pin number must not be negative, got {}",
                number
            )));
        }
        let number = u32::try_from(number)
            .map_err(|_| LinkError::invalid(format!("Pin number {} out of range", number)))?;
        Ok(Self { kind, number })
    }

    /// Pin kind.
    #[inline]
    pub fn kind(&self) -> PinKind {
        self.kind
    }

    /// Pin number.
    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self.kind {
            PinKind::Analog => 'A',
            PinKind::Digital => 'D',
        };
        write!(f, "{}{}", letter, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_by_kind_and_number() {
        assert_eq!(Pin::analog(3), Pin::analog(3));
        assert_ne!(Pin::analog(3), Pin::digital(3));
        assert_ne!(Pin::digital(3), Pin::digital(4));
    }

    #[test]
    fn test_new_rejects_negative() {
        let err = Pin::new(PinKind::Digital, -1).unwrap_err();
        assert!(matches!(err, LinkError::InvalidArgument(_)));
    }

    #[test]
    fn test_new_rejects_overflow() {
        let err = Pin::new(PinKind::Analog, i64::from(u32::MAX) + 1).unwrap_err();
        assert!(matches!(err, LinkError::InvalidArgument(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Pin::analog(9).to_string(), "A9");
        assert_eq!(Pin::digital(0).to_string(), "D0");
    }
}
