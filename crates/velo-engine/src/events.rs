//! Typed synchronous event bus for route observers.

use velo_core::{RouteResult, SectionId, WaypointId};

#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    SectionAdded {
        section: SectionId,
        index: usize,
    },
    SectionRemoved {
        section: SectionId,
        index: usize,
    },
    CalculationStarting {
        section: SectionId,
    },
    CalculationRetrying {
        section: SectionId,
        attempt: u32,
        max_retries: u32,
        reason: String,
    },
    CalculationFinished {
        section: SectionId,
        index: usize,
        result: RouteResult,
    },
    /// One per settled burst of calculations.
    RouteChanged {
        initial_load: bool,
    },
    FileSplitChanged {
        waypoint: WaypointId,
        is_file_split: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&RouteEvent) + Send>;

/// Handlers run in subscription order on the thread that publishes.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, Handler)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&RouteEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _)| *sub != id);
        self.handlers.len() != before
    }

    pub fn publish(&mut self, event: &RouteEvent) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
