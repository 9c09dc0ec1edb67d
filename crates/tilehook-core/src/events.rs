#![forbid(unsafe_code)]

//! Distribution of panel-level events to individual tile wrappers.
//!
//! The distributor is created lazily, the first time the host hands the
//! panel a tile collection, and is bound to the host's tile host object.
//! Wrappers subscribe by key when they are created; the registry drops a
//! key's subscription when it destroys the wrapper.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::{ConfigDelta, PanelConfig};
use crate::host::HostRef;
use crate::intercept::isolate;

/// Event delivered to subscribed tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    /// Panel settings changed; `config` is the state after applying `delta`.
    ConfigChanged {
        delta: ConfigDelta,
        config: PanelConfig,
    },
}

/// Receiver side of the distributor.
pub trait TileEventListener {
    fn on_tile_event(&self, event: &TileEvent);
}

/// Fan-out of [`TileEvent`]s keyed by tile.
pub struct TileEventDistributor {
    host: HostRef,
    listeners: RefCell<Vec<(String, Rc<dyn TileEventListener>)>>,
}

impl TileEventDistributor {
    pub fn new(host: HostRef) -> Self {
        Self {
            host,
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// The host's tile host object.
    #[must_use]
    pub fn host(&self) -> &HostRef {
        &self.host
    }

    /// Register `listener` under `key`, replacing any previous listener for
    /// the same key.
    pub fn subscribe(&self, key: impl Into<String>, listener: Rc<dyn TileEventListener>) {
        let key = key.into();
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|(k, _)| *k != key);
        listeners.push((key, listener));
    }

    pub fn unsubscribe(&self, key: &str) {
        self.listeners.borrow_mut().retain(|(k, _)| k != key);
    }

    #[must_use]
    pub fn is_subscribed(&self, key: &str) -> bool {
        self.listeners.borrow().iter().any(|(k, _)| k == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Deliver `event` to every subscriber in subscription order.
    ///
    /// The listener list is snapshotted first so listeners may subscribe or
    /// unsubscribe while handling the event. A listener that panics is logged
    /// and the remaining listeners still receive the event.
    pub fn dispatch(&self, event: &TileEvent) {
        let snapshot: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .map(|(k, l)| (k.clone(), Rc::clone(l)))
            .collect();
        for (key, listener) in snapshot {
            tracing::trace!(target: "tilehook.events", key = %key, ?event, "dispatch");
            if let Err(err) = isolate(|| {
                listener.on_tile_event(event);
                Ok(())
            }) {
                tracing::error!(
                    target: "tilehook.events",
                    key = %key,
                    operation = "dispatch",
                    error = %err,
                    "tile event listener failed"
                );
            }
        }
    }
}

impl fmt::Debug for TileEventDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.listeners.borrow().iter().map(|(k, _)| k.clone()).collect();
        f.debug_struct("TileEventDistributor")
            .field("host", &self.host)
            .field("listeners", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FieldBag;
    use std::cell::Cell;

    struct Counter(Cell<u32>);

    fn changed() -> TileEvent {
        TileEvent::ConfigChanged {
            delta: ConfigDelta::columns(4),
            config: PanelConfig::default(),
        }
    }

    impl TileEventListener for Counter {
        fn on_tile_event(&self, _event: &TileEvent) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn subscribe_replaces_same_key() {
        let distributor = TileEventDistributor::new(FieldBag::new("QSTileHost").into_ref());
        let first = Rc::new(Counter(Cell::new(0)));
        let second = Rc::new(Counter(Cell::new(0)));
        distributor.subscribe("wifi", first.clone());
        distributor.subscribe("wifi", second.clone());
        assert_eq!(distributor.len(), 1);

        distributor.dispatch(&changed());
        assert_eq!(first.0.get(), 0);
        assert_eq!(second.0.get(), 1);
    }

    struct Exploding;

    impl TileEventListener for Exploding {
        fn on_tile_event(&self, _event: &TileEvent) {
            panic!("listener exploded");
        }
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let distributor = TileEventDistributor::new(FieldBag::new("QSTileHost").into_ref());
        let before = Rc::new(Counter(Cell::new(0)));
        let after = Rc::new(Counter(Cell::new(0)));
        distributor.subscribe("wifi", before.clone());
        distributor.subscribe("bt", Rc::new(Exploding));
        distributor.subscribe("cell", after.clone());

        distributor.dispatch(&changed());
        assert_eq!(before.0.get(), 1);
        assert_eq!(after.0.get(), 1);
        assert!(distributor.is_subscribed("bt"));
    }

    #[test]
    fn unsubscribed_keys_stop_receiving() {
        let distributor = TileEventDistributor::new(FieldBag::new("QSTileHost").into_ref());
        let counter = Rc::new(Counter(Cell::new(0)));
        distributor.subscribe("bt", counter.clone());
        distributor.unsubscribe("bt");
        assert!(distributor.is_empty());
        distributor.dispatch(&changed());
        assert_eq!(counter.0.get(), 0);
    }
}
