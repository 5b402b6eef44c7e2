//! Lifecycle fan-out for one topology
//!
//! Every stream of a topology registers here under the key of the component
//! that owns it. Starting, stopping and handing off a topology goes through
//! the generator so each component sees its lifecycle events exactly once and
//! in registration order.

use std::sync::Arc;

use parking_lot::Mutex;

use super::types::TimeUnit;

/// Identity of the component a stream belongs to.
///
/// Streams of one component share the key; a component that appears in two
/// topologies registers the same key in both generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(pub u64);

/// Lifecycle callbacks of a stream node.
///
/// Called with the generator lock held: implementations must not call back
/// into the generator that notifies them.
pub trait StreamListener: Send + Sync {
    fn on_component_start(&self, _time: TimeUnit) {}

    fn on_component_stop(&self, _time: TimeUnit) {}

    fn on_stream_start(&self, _time: TimeUnit) {}

    fn on_stream_stop(&self, _time: TimeUnit) {}

    /// Whether the stream has produced everything up to `drain_time`.
    fn is_drainable_or_drained(&self, _drain_time: TimeUnit) -> bool {
        true
    }
}

struct Registration {
    key: ComponentKey,
    listeners: Vec<Arc<dyn StreamListener>>,
    /// Scratch flag, only meaningful during a handoff.
    transferred: bool,
}

impl Registration {
    fn start(&self, time: TimeUnit) {
        if !self.transferred {
            if let Some(first) = self.listeners.first() {
                first.on_component_start(time);
            }
        }
        for listener in &self.listeners {
            listener.on_stream_start(time);
        }
    }

    fn stop(&self, time: TimeUnit) {
        for listener in &self.listeners {
            listener.on_stream_stop(time);
        }
        if !self.transferred {
            if let Some(first) = self.listeners.first() {
                first.on_component_stop(time);
            }
        }
    }
}

/// Per-topology lifecycle hub.
#[derive(Default)]
pub struct MessageGenerator {
    registrations: Mutex<Vec<Registration>>,
}

impl MessageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` under `key`.
    pub fn register_listener(&self, listener: Arc<dyn StreamListener>, key: ComponentKey) {
        let mut registrations = self.registrations.lock();
        match registrations.iter_mut().find(|r| r.key == key) {
            Some(registration) => registration.listeners.push(listener),
            None => registrations.push(Registration {
                key,
                listeners: vec![listener],
                transferred: false,
            }),
        }
    }

    /// Drop every registration. Called once when the topology is torn down.
    pub fn clear_listeners(&self) {
        self.registrations.lock().clear();
    }

    pub fn component_count(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn contains(&self, key: ComponentKey) -> bool {
        self.registrations.lock().iter().any(|r| r.key == key)
    }

    /// Start every component once, then every stream.
    pub fn clock_start(&self, time: TimeUnit) {
        let registrations = self.registrations.lock();
        for registration in registrations.iter() {
            registration.start(time);
        }
    }

    /// Start this topology in place of `prev`.
    ///
    /// Components registered in both generators keep running: their streams
    /// are stopped on `prev` and started here, with no component events.
    ///
    /// # Panics
    ///
    /// Panics if `prev` is this generator.
    pub fn clock_start_with_handoff(&self, time: TimeUnit, prev: &MessageGenerator) {
        assert!(
            !std::ptr::eq(self, prev),
            "a topology cannot hand off to itself"
        );

        let mut registrations = self.registrations.lock();
        let mut prev_registrations = prev.registrations.lock();

        for registration in registrations.iter_mut() {
            if let Some(old) = prev_registrations
                .iter_mut()
                .find(|r| r.key == registration.key)
            {
                old.transferred = true;
                registration.transferred = true;
            }
        }

        for old in prev_registrations.iter() {
            old.stop(time);
        }
        for registration in registrations.iter() {
            registration.start(time);
        }

        for registration in registrations.iter_mut() {
            registration.transferred = false;
        }
        for old in prev_registrations.iter_mut() {
            old.transferred = false;
        }
    }

    /// Stop every stream, then its component.
    pub fn clock_stop(&self, time: TimeUnit) {
        let registrations = self.registrations.lock();
        for registration in registrations.iter() {
            registration.stop(time);
        }
    }

    /// True only if every registered stream reports drained up to `time`.
    pub fn is_drainable(&self, time: TimeUnit) -> bool {
        let registrations = self.registrations.lock();
        registrations
            .iter()
            .flat_map(|r| r.listeners.iter())
            .all(|listener| listener.is_drainable_or_drained(time))
    }
}

impl std::fmt::Debug for MessageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<_> = self.registrations.lock().iter().map(|r| r.key).collect();
        f.debug_struct("MessageGenerator")
            .field("components", &keys)
            .finish()
    }
}
