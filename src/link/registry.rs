//! Listener registry: subscriptions and per-pin reference counts.
//!
//! Dispatch takes a snapshot of the matching entries under a read lock and
//! runs callbacks outside of it. Reference counts live behind an async
//! mutex that the link holds across the start/stop listening write, so a
//! count transition and its handshake command form one atomic unit.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use super::subscription::{Callback, SubscriptionHandle};
use crate::protocol::{Event, Pin, PinKind};

/// What an entry listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Pin events of one kind, optionally one pin only.
    Pins { kind: PinKind, pin: Option<Pin> },
    /// Reply events.
    Replies,
}

impl Target {
    fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Target::Replies, Event::ReplyReceived { .. }) => true,
            (Target::Pins { kind, pin }, event) => match event.pin() {
                Some(event_pin) => {
                    event_pin.kind() == *kind && pin.map_or(true, |p| p == event_pin)
                }
                None => false,
            },
            _ => false,
        }
    }
}

struct Entry {
    id: u64,
    target: Target,
    callback: Callback,
}

/// Registry of listeners owned by a link.
pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<Arc<Entry>>>,
    counts: Mutex<HashMap<Pin, usize>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            counts: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Per-pin counts of filtered subscriptions.
    pub(crate) fn counts(&self) -> &Mutex<HashMap<Pin, usize>> {
        &self.counts
    }

    /// Add an entry; it receives events from the next dispatch on.
    pub(crate) fn insert(&self, target: Target, callback: Callback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Entry {
                id,
                target,
                callback,
            }));
        SubscriptionHandle(id)
    }

    /// Remove an entry, returning what it listened to.
    pub(crate) fn remove(&self, handle: SubscriptionHandle) -> Option<Target> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let index = entries.iter().position(|e| e.id == handle.0)?;
        Some(entries.remove(index).target)
    }

    /// Handles of every registered entry, in registration order.
    pub(crate) fn handles(&self) -> Vec<SubscriptionHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| SubscriptionHandle(e.id))
            .collect()
    }

    /// Number of registered entries.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver an event to every matching entry, in registration order.
    ///
    /// A failing or panicking callback is logged and does not prevent
    /// delivery to the remaining entries.
    pub(crate) fn dispatch(&self, event: &Event) {
        let matching: Vec<Arc<Entry>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.target.matches(event))
            .cloned()
            .collect();

        for entry in matching {
            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("Listener {} failed on {:?}: {}", entry.id, event, e);
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("Listener {} panicked on {:?}: {}", entry.id, event, msg);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ListenerResult;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<Event>>>, Callback) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Callback = Arc::new(move |event: &Event| -> ListenerResult {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        (seen, callback)
    }

    #[test]
    fn test_filtered_entry_ignores_other_pins() {
        let registry = ListenerRegistry::new();
        let (seen, callback) = recorder();
        registry.insert(
            Target::Pins {
                kind: PinKind::Digital,
                pin: Some(Pin::digital(5)),
            },
            callback,
        );

        registry.dispatch(&Event::DigitalPinValueChanged { pin: 6, value: true });
        registry.dispatch(&Event::DigitalPinValueChanged { pin: 5, value: true });
        registry.dispatch(&Event::AnalogPinValueChanged { pin: 5, value: 1 });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::DigitalPinValueChanged { pin: 5, value: true }]
        );
    }

    #[test]
    fn test_unfiltered_entry_sees_all_of_kind() {
        let registry = ListenerRegistry::new();
        let (seen, callback) = recorder();
        registry.insert(
            Target::Pins {
                kind: PinKind::Analog,
                pin: None,
            },
            callback,
        );

        registry.dispatch(&Event::AnalogPinValueChanged { pin: 1, value: 1 });
        registry.dispatch(&Event::AnalogPinValueChanged { pin: 2, value: 2 });
        registry.dispatch(&Event::DigitalPinValueChanged { pin: 1, value: true });
        registry.dispatch(&Event::ReplyReceived {
            id: 1,
            status: crate::protocol::ReplyStatus::Ok,
        });

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_reply_target() {
        let registry = ListenerRegistry::new();
        let (seen, callback) = recorder();
        registry.insert(Target::Replies, callback);

        registry.dispatch(&Event::AnalogPinValueChanged { pin: 1, value: 1 });
        registry.dispatch(&Event::ReplyReceived {
            id: 9,
            status: crate::protocol::ReplyStatus::Ko,
        });

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failing_listeners_do_not_interfere() {
        let registry = ListenerRegistry::new();
        let all_digital = Target::Pins {
            kind: PinKind::Digital,
            pin: None,
        };
        registry.insert(
            all_digital,
            Arc::new(|_: &Event| -> ListenerResult { Err("boom".into()) }),
        );
        registry.insert(
            all_digital,
            Arc::new(|_: &Event| -> ListenerResult { panic!("listener panic") }),
        );
        let (seen, callback) = recorder();
        registry.insert(all_digital, callback);

        registry.dispatch(&Event::DigitalPinValueChanged { pin: 1, value: true });

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ListenerRegistry::new();
        let (seen, callback) = recorder();
        let target = Target::Pins {
            kind: PinKind::Digital,
            pin: None,
        };
        let handle = registry.insert(target, callback);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handles(), vec![handle]);

        assert_eq!(registry.remove(handle), Some(target));
        assert_eq!(registry.remove(handle), None);

        registry.dispatch(&Event::DigitalPinValueChanged { pin: 1, value: true });
        assert!(seen.lock().unwrap().is_empty());
    }
}
