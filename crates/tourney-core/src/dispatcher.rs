//! In-process typed event dispatch.
//!
//! The dispatcher maps event kinds to ordered handler lists. It never
//! produces network traffic; the connection session feeds it inbound events
//! and the only way out to the wire is the session's `send`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tourney_protocol::{codec, Event, EventKind};
use tracing::{debug, trace, warn};

/// A registered event handler.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handler entry with its registration id.
struct HandlerEntry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    /// Handlers indexed by kind, in registration order.
    handlers: DashMap<EventKind, Vec<HandlerEntry>>,
    /// Source of registration ids.
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut removed = false;
        let mut now_empty = false;

        if let Some(mut entries) = self.handlers.get_mut(&kind) {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            removed = entries.len() != before;
            now_empty = entries.is_empty();
        }

        if now_empty {
            self.handlers.remove_if(&kind, |_, entries| entries.is_empty());
        }
        removed
    }
}

/// Typed publish/subscribe registry.
///
/// Handlers for one kind run synchronously, in registration order. Each
/// dispatch works on a copy of the handler list taken when it starts, so a
/// handler may subscribe or unsubscribe without affecting the event being
/// delivered.
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
        }
    }

    /// Register a handler for one event kind.
    ///
    /// Returns a handle that removes the handler again.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .entry(kind)
            .or_default()
            .push(HandlerEntry {
                id,
                handler: Arc::new(handler),
            });

        debug!(kind = %kind, id, "Handler subscribed");

        Subscription {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every handler registered for its kind.
    ///
    /// Returns the number of handlers invoked. Unknown events reach no handler.
    pub fn publish(&self, event: &Event) -> usize {
        let Some(kind) = event.kind() else {
            trace!(event_type = %event.type_name(), "No handlers for unknown event type");
            return 0;
        };

        let handlers: Vec<Handler> = match self.registry.handlers.get(&kind) {
            Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(event);
        }

        trace!(kind = %kind, handlers = handlers.len(), "Dispatched event");
        handlers.len()
    }

    /// Decode a raw envelope and publish it.
    ///
    /// Malformed input is logged and dropped; returns the number of handlers
    /// invoked.
    pub fn dispatch_text(&self, text: &str) -> usize {
        match codec::decode(text) {
            Ok(event) => self.publish(&event),
            Err(e) => {
                warn!(error = %e, "Dropping malformed event");
                0
            }
        }
    }

    /// Number of handlers registered for a kind.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .handlers
            .get(&kind)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            kind_count: self.registry.handlers.len(),
            handler_count: self.registry.handlers.iter().map(|e| e.len()).sum(),
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
///
/// Dropping the handle keeps the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    registry: Weak<Registry>,
}

impl Subscription {
    /// The kind this subscription listens to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. Returns `false` if it was already removed or the
    /// dispatcher is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.remove(self.kind, self.id);
        if removed {
            debug!(kind = %self.kind, id = self.id, "Handler unsubscribed");
        }
        removed
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.handlers.len())
            .finish()
    }
}

/// Dispatcher statistics.
#[derive(Debug, Clone)]
pub struct DispatcherStats {
    /// Number of kinds with at least one handler.
    pub kind_count: usize,
    /// Total number of handlers.
    pub handler_count: usize,
}
