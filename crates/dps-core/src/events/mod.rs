//! Session notifications
//!
//! The session publishes one [`SessionEvent`] after each committed state
//! change. Front ends register listeners per [`EventKind`]; a listener never
//! sees a kind it did not ask for.

use ahash::AHashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A baseline table was loaded from a source
    SourceLoaded {
        source_label: String,
        row_count: usize,
        column_count: usize,
    },
    /// The current table changed (edit, undo, redo, jump, reset, refresh)
    TableChanged {
        row_count: usize,
        column_count: usize,
        history_index: usize,
    },
    /// The history cursor moved without a new edit
    HistoryMoved {
        index: usize,
        can_undo: bool,
        can_redo: bool,
    },
    ProjectLoaded { path: String },
    /// Subset cache files were discarded
    SubsetCachesCleared { removed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SourceLoaded,
    TableChanged,
    HistoryMoved,
    ProjectLoaded,
    SubsetCachesCleared,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SourceLoaded { .. } => EventKind::SourceLoaded,
            SessionEvent::TableChanged { .. } => EventKind::TableChanged,
            SessionEvent::HistoryMoved { .. } => EventKind::HistoryMoved,
            SessionEvent::ProjectLoaded { .. } => EventKind::ProjectLoaded,
            SessionEvent::SubsetCachesCleared { .. } => EventKind::SubsetCachesCleared,
        }
    }
}

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<AHashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` for every later event of `kind`
    pub fn subscribe<F>(&self, kind: EventKind, listener: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.listeners.lock().entry(kind).or_default().push(Box::new(listener));
    }

    /// Deliver `event` to its listeners in subscription order.
    ///
    /// Listeners run under the bus lock and must not subscribe or publish.
    pub fn publish(&self, event: SessionEvent) {
        let mut listeners = self.listeners.lock();
        if let Some(targets) = listeners.get_mut(&event.kind()) {
            for listener in targets.iter_mut() {
                listener(&event);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_struct("EventBus")
            .field("kinds", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_reaches_matching_kind_only() {
        let bus = EventBus::new();
        let rows = Arc::new(AtomicUsize::new(0));

        let counter = rows.clone();
        bus.subscribe(EventKind::TableChanged, move |event| {
            if let SessionEvent::TableChanged { row_count, .. } = event {
                counter.fetch_add(*row_count, Ordering::SeqCst);
            }
        });

        bus.publish(SessionEvent::TableChanged {
            row_count: 3,
            column_count: 2,
            history_index: 1,
        });
        bus.publish(SessionEvent::ProjectLoaded { path: "p.dps".into() });
        assert_eq!(rows.load(Ordering::SeqCst), 3);
        assert_eq!(bus.listener_count(EventKind::TableChanged), 1);
        assert_eq!(bus.listener_count(EventKind::ProjectLoaded), 0);
    }

    #[test]
    fn test_listeners_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = order.clone();
            bus.subscribe(EventKind::SubsetCachesCleared, move |_| order.lock().push(tag));
        }
        bus.publish(SessionEvent::SubsetCachesCleared { removed: 2 });
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }
}
