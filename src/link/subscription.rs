//! Subscriptions and their handles.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{Event, Pin, PinKind};

/// Result type returned by listener callbacks.
///
/// An `Err` is logged by the dispatcher and never reaches other listeners.
pub type ListenerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Shared listener callback.
pub(crate) type Callback = Arc<dyn Fn(&Event) -> ListenerResult + Send + Sync>;

/// Interest in events of one pin kind, optionally restricted to one pin.
///
/// The pin filter is validated when the subscription is registered.
///
/// ```
/// use alplink::link::Subscription;
/// use alplink::protocol::PinKind;
///
/// let all = Subscription::all(PinKind::Analog, |event| {
///     println!("{:?}", event);
///     Ok(())
/// });
/// assert_eq!(all.pin(), None);
///
/// let one = Subscription::for_pin(PinKind::Digital, 13, |_| Ok(()));
/// assert_eq!(one.pin(), Some(13));
/// ```
pub struct Subscription {
    kind: PinKind,
    pin: Option<i64>,
    callback: Callback,
}

impl Subscription {
    /// Subscribe to every event of the given kind.
    pub fn all<F>(kind: PinKind, callback: F) -> Self
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            kind,
            pin: None,
            callback: Arc::new(callback),
        }
    }

    /// Subscribe to events of one pin.
    pub fn for_pin<F>(kind: PinKind, pin: i64, callback: F) -> Self
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            kind,
            pin: Some(pin),
            callback: Arc::new(callback),
        }
    }

    /// Pin kind this subscription listens to.
    pub fn kind(&self) -> PinKind {
        self.kind
    }

    /// Raw pin filter as given by the caller.
    pub fn pin(&self) -> Option<i64> {
        self.pin
    }

    /// Validated pin filter.
    pub(crate) fn pin_filter(&self) -> Result<Option<Pin>> {
        self.pin.map(|n| Pin::new(self.kind, n)).transpose()
    }

    pub(crate) fn into_callback(self) -> Callback {
        self.callback
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("pin", &self.pin)
            .finish_non_exhaustive()
    }
}

/// Opaque handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;

    #[test]
    fn test_pin_filter_validation() {
        let sub = Subscription::for_pin(PinKind::Analog, 5, |_| Ok(()));
        assert_eq!(sub.pin_filter().unwrap(), Some(Pin::analog(5)));

        let sub = Subscription::all(PinKind::Digital, |_| Ok(()));
        assert_eq!(sub.pin_filter().unwrap(), None);

        let sub = Subscription::for_pin(PinKind::Digital, -3, |_| Ok(()));
        assert!(matches!(sub.pin_filter(), Err(LinkError::InvalidArgument(_))));
    }
}
