use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::common::{EventKind, ServerEvent};

pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct Registration {
    id: u64,
    subscriber: String,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

impl Registry {
    fn remove(&mut self, kind: EventKind, matches: impl Fn(&Registration) -> bool) -> bool {
        let Some(registrations) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|registration| !matches(registration));
        before != registrations.len()
    }
}

/// Routes validated inbound events to the handlers subscribed to their name.
///
/// Each `(event, subscriber)` pair holds at most one handler: subscribing again under
/// the same key replaces the earlier handler, so a view that re-registers after a
/// remount never receives an event twice.
#[derive(Clone, Default)]
pub struct EventRouter {
    registry: Arc<Mutex<Registry>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for `kind`. The handler stays active until the returned
    /// [`Subscription`] is dropped or [`EventRouter::off`] removes it.
    pub fn on<F>(&self, kind: EventKind, subscriber: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let subscriber = subscriber.into();
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;

        if registry.remove(kind, |registration| registration.subscriber == subscriber) {
            log::debug!(
                "Replacing `{}` handler held by {subscriber}",
                kind.name()
            );
        }
        registry.handlers.entry(kind).or_default().push(Registration {
            id,
            subscriber,
            handler: Arc::new(handler),
        });

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
        }
    }

    /// Removes the handler `subscriber` holds for `kind`. Safe to call repeatedly.
    pub fn off(&self, kind: EventKind, subscriber: &str) -> bool {
        self.lock()
            .remove(kind, |registration| registration.subscriber == subscriber)
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to every handler registered for its name, in registration
    /// order, and returns how many ran.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        // Handlers may subscribe or unsubscribe, so call them outside the lock.
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .get(&event.kind())
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|registration| Arc::clone(&registration.handler))
                    .collect()
            })
            .unwrap_or_default();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// Keeps one handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// False once the handler has been removed or replaced.
    pub fn is_active(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .handlers
            .get(&self.kind)
            .is_some_and(|registrations| {
                registrations.iter().any(|registration| registration.id == self.id)
            })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let id = self.id;
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.kind, |registration| registration.id == id);
        }
    }
}
