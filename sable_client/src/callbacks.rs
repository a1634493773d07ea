//! The per-code table of event handlers.

use crate::event::Event;
use crate::id::*;

use parking_lot::RwLock;
use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

/// The code under which a handler receives every event.
pub const WILDCARD: &str = "*";

/// A handler for inbound events.
///
/// Returned errors (and panics) are logged and isolated from other handlers.
pub type Callback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

type HandlerList = Vec<(CallbackId, Callback)>;

/// Maps event codes to an ordered list of handlers.
///
/// Handlers are free to register or unregister other handlers while being
/// dispatched; each dispatch works from a snapshot of the list taken before
/// the first handler runs.
pub struct CallbackRegistry {
    id_generator: CallbackIdGenerator,
    handlers: RwLock<HashMap<String, HandlerList>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            id_generator: CallbackIdGenerator::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Add a handler for the given code, after any existing handlers for it.
    pub fn register<F>(&self, code: &str, handler: F) -> CallbackId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.id_generator.next();
        self.handlers
            .write()
            .entry(code.to_ascii_uppercase())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a single handler. Unknown ids are ignored.
    pub fn unregister(&self, code: &str, id: CallbackId) {
        let code = code.to_ascii_uppercase();
        let mut handlers = self.handlers.write();

        if let Some(list) = handlers.get_mut(&code) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                handlers.remove(&code);
            }
        }
    }

    /// Swap the handler behind an existing id, keeping its place in the order.
    ///
    /// Returns `false` if no handler with that id is registered for `code`.
    pub fn replace<F>(&self, code: &str, id: CallbackId, handler: F) -> bool
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write();

        match handlers
            .get_mut(&code.to_ascii_uppercase())
            .and_then(|list| list.iter_mut().find(|(existing, _)| *existing == id))
        {
            Some(entry) => {
                entry.1 = Arc::new(handler);
                true
            }
            None => false,
        }
    }

    /// Remove every handler for the given code.
    pub fn clear(&self, code: &str) {
        self.handlers.write().remove(&code.to_ascii_uppercase());
    }

    /// Remove every handler for every code.
    pub fn clear_all(&self) {
        self.handlers.write().clear();
    }

    /// Whether any handler is registered for the given code.
    pub fn has_handlers(&self, code: &str) -> bool {
        self.handlers
            .read()
            .get(&code.to_ascii_uppercase())
            .map_or(false, |list| !list.is_empty())
    }

    /// Invoke, in registration order, every handler registered for the event's
    /// code, followed by the wildcard handlers.
    pub fn dispatch(&self, event: &Event) {
        let snapshot: HandlerList = {
            let handlers = self.handlers.read();
            let specific = handlers.get(&event.code).into_iter().flatten();
            // An event whose code is itself "*" already matched them above
            let wildcard = match event.code.as_str() {
                WILDCARD => None,
                _ => handlers.get(WILDCARD),
            };
            specific.chain(wildcard.into_iter().flatten()).cloned().collect()
        };

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(code = %event.code, callback = %id, "Error in event handler: {:#}", e);
                }
                Err(_) => {
                    tracing::error!(code = %event.code, callback = %id, "Event handler panicked");
                }
            }
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
