//! Event sink for delivery notifications.
//!
//! Listeners run on the delivery worker thread, in registration order, with no
//! internal lock held. Hosts that need the notification elsewhere forward it
//! themselves, e.g. over a channel.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{DeliveryEvent, ErrorEvent};

/// Receives delivery outcomes.
pub trait DeliveryListener: Send + Sync {
    /// Called after the server accepted a message.
    fn on_delivery(&self, _event: &DeliveryEvent) {}

    /// Called after a cycle or a message failed.
    fn on_error(&self, _event: &ErrorEvent) {}
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct DeliveryFn<F>(F);

impl<F> DeliveryListener for DeliveryFn<F>
where
    F: Fn(&DeliveryEvent) + Send + Sync,
{
    fn on_delivery(&self, event: &DeliveryEvent) {
        (self.0)(event)
    }
}

struct ErrorFn<F>(F);

impl<F> DeliveryListener for ErrorFn<F>
where
    F: Fn(&ErrorEvent) + Send + Sync,
{
    fn on_error(&self, event: &ErrorEvent) {
        (self.0)(event)
    }
}

type ListenerList = Vec<(ListenerId, Arc<dyn DeliveryListener>)>;

/// Registry of delivery listeners owned by a client.
#[derive(Default)]
pub struct ClientEvents {
    listeners: RwLock<ListenerList>,
    next_id: AtomicU64,
}

impl ClientEvents {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn DeliveryListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Registers a closure called for every delivery.
    pub fn on_delivery<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&DeliveryEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(DeliveryFn(f)))
    }

    /// Registers a closure called for every failure.
    pub fn on_error<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(ErrorFn(f)))
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn DeliveryListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn emit_delivery(&self, event: &DeliveryEvent) {
        for listener in self.snapshot() {
            listener.on_delivery(event);
        }
    }

    pub(crate) fn emit_error(&self, event: &ErrorEvent) {
        for listener in self.snapshot() {
            listener.on_error(event);
        }
    }
}

impl fmt::Debug for ClientEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
