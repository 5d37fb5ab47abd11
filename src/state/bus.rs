//! Event bus.
//!
//! Per-[`EventKind`] registry of handlers. Dispatch is synchronous and in
//! registration order; a failing handler never stops the ones after it.
//! The registry keeps no history, so a handler only sees events
//! dispatched after it was registered.
//!
//! The bus is a cheap cloneable handle onto one shared registry, meant to
//! live on a single thread alongside the connection that feeds it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, warn};

use super::protocol::{EventKind, ServerEvent};

/// What a handler returns. Errors are logged and counted, nothing more.
pub type HandlerResult = Result<(), Box<dyn std::error::Error>>;

type Handler = Rc<RefCell<dyn FnMut(&ServerEvent) -> HandlerResult>>;

/// Identifies one registration, for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Handlers that ran to completion with `Ok`
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
}

impl Registry {
    fn contains(&self, kind: EventKind, id: HandlerId) -> bool {
        self.handlers
            .get(&kind)
            .is_some_and(|list| list.iter().any(|(h, _)| *h == id))
    }
}

/// Event-kind keyed handler registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&ServerEvent) -> HandlerResult + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = HandlerId(registry.next_id);
        let handler: Handler = Rc::new(RefCell::new(handler));
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one handler, or every handler for `kind` when `id` is `None`.
    ///
    /// Returns how many handlers were removed.
    pub fn off(&self, kind: EventKind, id: Option<HandlerId>) -> usize {
        let mut registry = self.registry.borrow_mut();
        match id {
            Some(id) => {
                let Some(list) = registry.handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(h, _)| *h != id);
                let removed = before - list.len();
                if list.is_empty() {
                    registry.handlers.remove(&kind);
                }
                removed
            }
            None => registry
                .handlers
                .remove(&kind)
                .map_or(0, |list| list.len()),
        }
    }

    /// Deliver `event` to every handler currently registered for its kind.
    pub fn dispatch(&self, event: &ServerEvent) -> DispatchReport {
        let kind = event.kind();

        // Snapshot so handlers may subscribe/unsubscribe while we iterate
        let handlers: Vec<(HandlerId, Handler)> = self
            .registry
            .borrow()
            .handlers
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            // Removed by an earlier handler in this same dispatch
            if !self.registry.borrow().contains(kind, id) {
                continue;
            }

            let Ok(mut handler) = handler.try_borrow_mut() else {
                warn!(event = %kind, ?id, "Skipping re-entrant handler");
                report.failed += 1;
                continue;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| (*handler)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(event = %kind, ?id, error = %e, "Handler failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(event = %kind, ?id, "Handler panicked");
                    report.failed += 1;
                }
            }
        }

        debug!(
            event = %kind,
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched"
        );
        report
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .borrow()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        let mut counts: Vec<(EventKind, usize)> = registry
            .handlers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        counts.sort();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
