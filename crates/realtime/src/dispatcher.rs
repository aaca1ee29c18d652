//! Fan-out of decoded events to subscribers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::HandlerError;
use crate::events::{decode_frame, EventCategory, RealtimeEvent};

pub type EventHandler = Arc<dyn Fn(&RealtimeEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Capability returned by [`EventDispatcher::subscribe`]; hand it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    category: EventCategory,
    id: u64,
}

impl SubscriptionHandle {
    pub fn category(&self) -> EventCategory {
        self.category
    }
}

#[derive(Clone)]
struct Registration {
    id: u64,
    handler: EventHandler,
    // Flipped on removal so an in-progress dispatch skips it.
    active: Arc<AtomicBool>,
}

/// Registry of handlers per category.
///
/// Handlers run synchronously on the dispatching task, in registration order.
/// The registry lock is never held while a handler runs, so handlers may
/// subscribe or unsubscribe from inside a callback.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<HashMap<EventCategory, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, category: EventCategory, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RealtimeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe_shared(category, Arc::new(handler))
    }

    /// Register an already shared handler. Registering the same handler twice
    /// yields two independent registrations, each invoked per event.
    pub fn subscribe_shared(&self, category: EventCategory, handler: EventHandler) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .entry(category)
            .or_default()
            .push(Registration {
                id,
                handler,
                active: Arc::new(AtomicBool::new(true)),
            });
        debug!(%category, id, "subscribed");
        SubscriptionHandle { category, id }
    }

    /// Remove a registration. Returns whether it was still present.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut registry = self.registry.lock();
        let Some(registrations) = registry.get_mut(&handle.category) else {
            return false;
        };
        let Some(index) = registrations.iter().position(|r| r.id == handle.id) else {
            return false;
        };
        let removed = registrations.remove(index);
        removed.active.store(false, Ordering::Release);
        debug!(category = %handle.category, id = handle.id, "unsubscribed");
        true
    }

    /// Decode a raw text frame and deliver it. Malformed frames are reported
    /// and dropped. Returns the number of handlers invoked.
    pub fn dispatch(&self, frame: &str) -> usize {
        match decode_frame(frame) {
            Ok(Some(event)) => self.publish(&event),
            Ok(None) => {
                debug!("dropping frame with unrecognised type");
                0
            }
            Err(error) => {
                warn!(%error, "dropping malformed frame");
                0
            }
        }
    }

    /// Deliver an already-decoded event to every handler of its category.
    pub fn publish(&self, event: &RealtimeEvent) -> usize {
        let category = event.category();
        let registrations = match self.registry.lock().get(&category) {
            Some(registrations) => registrations.clone(),
            None => return 0,
        };

        let mut invoked = 0;
        for registration in registrations {
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }
            invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| (registration.handler)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(%category, id = registration.id, %error, "event handler failed");
                }
                Err(_) => {
                    error!(%category, id = registration.id, "event handler panicked");
                }
            }
        }
        invoked
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut registry = self.registry.lock();
        for registration in registry.values().flatten() {
            registration.active.store(false, Ordering::Release);
        }
        registry.clear();
        debug!("cleared all subscriptions");
    }

    pub fn handler_count(&self, category: EventCategory) -> usize {
        self.registry
            .lock()
            .get(&category)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
