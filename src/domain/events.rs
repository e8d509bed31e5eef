use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::Arc;

use crate::domain::chart::{ChartPane, Gap, Viewport};
use crate::domain::market_data::{InstrumentId, TimeInterval};
use crate::domain::state::ChartSnapshot;

pub trait DomainEvent: Debug + Clone {
    fn event_type(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub enum ChartEvent {
    /// Immediate fan-out of a relayout to the other linked panes
    ViewportBroadcast { source: ChartPane, viewport: Option<Viewport>, targets: Vec<ChartPane> },
    GapsDetected { gaps: Vec<Gap> },
    BackfillApplied { generation: u64, points: usize },
    BackfillDiscarded { generation: u64 },
    LoadingChanged { visible: bool },
    StoreReset { instrument: InstrumentId, interval: TimeInterval },
    SeriesUpdated(Arc<ChartSnapshot>),
}

impl DomainEvent for ChartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChartEvent::ViewportBroadcast { .. } => "ViewportBroadcast",
            ChartEvent::GapsDetected { .. } => "GapsDetected",
            ChartEvent::BackfillApplied { .. } => "BackfillApplied",
            ChartEvent::BackfillDiscarded { .. } => "BackfillDiscarded",
            ChartEvent::LoadingChanged { .. } => "LoadingChanged",
            ChartEvent::StoreReset { .. } => "StoreReset",
            ChartEvent::SeriesUpdated(_) => "SeriesUpdated",
        }
    }
}

pub trait EventDispatcher {
    fn publish_chart_event(&self, event: ChartEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Synchronous fan-out to registered handlers, in subscription order
#[derive(Default)]
pub struct InMemoryEventDispatcher {
    next_id: u32,
    chart_handlers: Vec<(SubscriptionId, Box<dyn Fn(&ChartEvent)>)>,
}

impl InMemoryEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_to_chart_events<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChartEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.chart_handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.chart_handlers.len();
        self.chart_handlers.retain(|(handler_id, _)| *handler_id != id);
        before != self.chart_handlers.len()
    }
}

impl EventDispatcher for InMemoryEventDispatcher {
    fn publish_chart_event(&self, event: ChartEvent) {
        for (_, handler) in &self.chart_handlers {
            handler(&event);
        }
    }
}

type Delivery = Box<dyn FnOnce()>;

/// Queue of handler calls held back until the publisher has released
/// whatever it borrowed while publishing.
#[derive(Clone, Default)]
pub struct EventOutbox {
    pending: Rc<RefCell<VecDeque<Delivery>>>,
}

impl EventOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `handler` so each event is queued instead of delivered in place.
    pub fn defer<F>(&self, handler: F) -> impl Fn(&ChartEvent) + 'static
    where
        F: Fn(&ChartEvent) + 'static,
    {
        let handler = Rc::new(handler);
        let pending = Rc::clone(&self.pending);
        move |event: &ChartEvent| {
            let handler = Rc::clone(&handler);
            let event = event.clone();
            pending.borrow_mut().push_back(Box::new(move || handler(&event)));
        }
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Runs queued deliveries in order, including any queued by the
    /// handlers themselves. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(delivery) = next else {
                return delivered;
            };
            delivery();
            delivered += 1;
        }
    }
}
