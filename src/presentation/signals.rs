use std::sync::Arc;

use leptos::*;
use once_cell::sync::OnceCell;

use crate::application::{ChartSession, Sleeper};
use crate::domain::chart::{Gap, Viewport};
use crate::domain::events::{ChartEvent, SubscriptionId};
use crate::domain::market_data::TimeInterval;
use crate::domain::state::ChartSnapshot;
use crate::infrastructure::http::OhlcvTransport;

/// Reactive mirror of session events for Leptos views
#[derive(Clone, Copy)]
pub struct ChartSignals {
    pub snapshot: RwSignal<Arc<ChartSnapshot>>,
    pub viewport: RwSignal<Option<Viewport>>,
    pub loading: RwSignal<bool>,
    pub pending_gaps: RwSignal<Vec<Gap>>,
    pub interval: RwSignal<TimeInterval>,
    pub candle_count: RwSignal<usize>,
}

impl ChartSignals {
    /// Must run inside a reactive runtime
    pub fn new() -> Self {
        Self {
            snapshot: create_rw_signal(Arc::new(ChartSnapshot::default())),
            viewport: create_rw_signal(None),
            loading: create_rw_signal(false),
            pending_gaps: create_rw_signal(Vec::new()),
            interval: create_rw_signal(TimeInterval::OneMinute),
            candle_count: create_rw_signal(0),
        }
    }

    pub fn apply(&self, event: &ChartEvent) {
        match event {
            ChartEvent::ViewportBroadcast { viewport, .. } => self.viewport.set(*viewport),
            ChartEvent::GapsDetected { gaps } => self.pending_gaps.set(gaps.clone()),
            ChartEvent::BackfillApplied { .. } | ChartEvent::BackfillDiscarded { .. } => {
                self.pending_gaps.set(Vec::new())
            }
            ChartEvent::LoadingChanged { visible } => self.loading.set(*visible),
            ChartEvent::StoreReset { interval, .. } => {
                self.interval.set(*interval);
                self.pending_gaps.set(Vec::new());
                self.viewport.set(None);
            }
            ChartEvent::SeriesUpdated(snapshot) => {
                self.candle_count.set(snapshot.series.len());
                self.snapshot.set(Arc::clone(snapshot));
            }
        }
    }

    pub fn connect<T, S>(&self, session: &mut ChartSession<T, S>) -> SubscriptionId
    where
        T: OhlcvTransport + 'static,
        S: Sleeper + 'static,
    {
        let signals = *self;
        session.subscribe(move |event| signals.apply(event))
    }
}

impl Default for ChartSignals {
    fn default() -> Self {
        Self::new()
    }
}

static SIGNALS: OnceCell<ChartSignals> = OnceCell::new();

/// Process-wide signals for a single-chart page
pub fn chart_signals() -> &'static ChartSignals {
    SIGNALS.get_or_init(ChartSignals::new)
}
