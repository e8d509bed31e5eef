use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::application::backfill::{BackfillFetcher, BatchOutcome, FetchSettings, Sleeper};
use crate::application::config::EngineConfig;
use crate::application::viewport_sync::{SyncState, ViewportBroadcast, ViewportSynchronizer};
use crate::domain::chart::{ChartPane, ChartStyle, Gap, GapDetector, TimeRange, Viewport};
use crate::domain::errors::AppResult;
use crate::domain::events::{ChartEvent, EventDispatcher, InMemoryEventDispatcher, SubscriptionId};
use crate::domain::logging::LogComponent;
use crate::domain::market_data::{
    Candle, Downsampler, HeikinAshi, IndicatorBundle, InstrumentId, TimeInterval, TimeSeriesStore,
    Timestamp,
};
use crate::domain::state::ChartSnapshot;
use crate::infrastructure::dto::normalize_value;
use crate::infrastructure::http::OhlcvTransport;
use crate::{log_debug, log_info};

/// A gap-check round ready to be driven by the caller's executor
pub struct BackfillJob {
    pub generation: u64,
    pub gaps: Vec<Gap>,
    pub future: LocalBoxFuture<'static, BatchOutcome>,
}

/// Result of handing a finished batch back to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackfillCompletion {
    pub applied: bool,
    pub points: usize,
    /// Remaining time before the loading indicator may be hidden
    pub hide_loading_in_ms: Option<f64>,
}

/// Keeps the loading indicator up for a minimum time once shown
#[derive(Debug, Clone, Copy)]
struct LoadingIndicator {
    min_visible_ms: f64,
    shown_at: Option<f64>,
}

impl LoadingIndicator {
    fn new(min_visible_ms: u64) -> Self {
        Self { min_visible_ms: min_visible_ms as f64, shown_at: None }
    }

    fn visible(&self) -> bool {
        self.shown_at.is_some()
    }

    fn show(&mut self, now_ms: f64) -> bool {
        if self.shown_at.is_some() {
            return false;
        }
        self.shown_at = Some(now_ms);
        true
    }

    fn remaining(&self, now_ms: f64) -> f64 {
        self.shown_at.map_or(0.0, |shown| (shown + self.min_visible_ms - now_ms).max(0.0))
    }

    fn hide(&mut self) -> bool {
        self.shown_at.take().is_some()
    }
}

/// Host-facing chart session: store, synchronizer, fetcher and derived
/// display data for one group of linked panes.
///
/// Handlers run synchronously inside the mutating call and must not call
/// back into the session.
pub struct ChartSession<T, S> {
    config: EngineConfig,
    store: TimeSeriesStore,
    detector: GapDetector,
    downsampler: Downsampler,
    fetcher: BackfillFetcher<T, S>,
    sync: ViewportSynchronizer,
    loading: LoadingIndicator,
    style: ChartStyle,
    dispatcher: InMemoryEventDispatcher,
    snapshot: Arc<ChartSnapshot>,
}

impl<T, S> ChartSession<T, S>
where
    T: OhlcvTransport + 'static,
    S: Sleeper + 'static,
{
    pub fn new(config: EngineConfig, transport: Rc<T>, sleeper: Rc<S>) -> AppResult<Self> {
        config.validate()?;
        let settings = FetchSettings {
            base_url: config.api_base_url.clone(),
            exchange: config.exchange.clone(),
            rate_limit_backoff: std::time::Duration::from_millis(config.rate_limit_backoff_ms),
            trading_hours: config.trading_hours.clone(),
        };
        Ok(Self {
            store: TimeSeriesStore::new(TimeInterval::default(), config.trading_hours.clone()),
            detector: config.gap_detector(),
            downsampler: config.downsampler(),
            fetcher: BackfillFetcher::new(transport, sleeper, settings),
            sync: ViewportSynchronizer::new(config.debounce_ms, config.linked_panes.clone()),
            loading: LoadingIndicator::new(config.min_loading_ms),
            style: config.chart_style,
            dispatcher: InMemoryEventDispatcher::new(),
            snapshot: Arc::new(ChartSnapshot::default()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn last_served(&self) -> Option<TimeRange> {
        self.fetcher.last_served()
    }

    pub fn snapshot(&self) -> Arc<ChartSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChartEvent) + 'static,
    {
        self.dispatcher.subscribe_to_chart_events(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Switches instrument or interval. Clears the store, the served range,
    /// any pending debounce and in-flight batch.
    pub fn select(&mut self, instrument: InstrumentId, interval: TimeInterval) {
        log_info!(LogComponent::Application("ChartSession"), "select {} @ {}", instrument, interval);
        self.sync.reset();
        self.fetcher.reset();
        self.store.reset(instrument.clone(), interval);
        if self.loading.hide() {
            self.dispatcher.publish_chart_event(ChartEvent::LoadingChanged { visible: false });
        }
        self.dispatcher.publish_chart_event(ChartEvent::StoreReset { instrument, interval });
        self.refresh(true);
    }

    /// Initial page of history, already decoded
    pub fn load_history(&mut self, points: Vec<Candle>) -> usize {
        let accepted = self.store.ingest(points);
        self.refresh(false);
        accepted
    }

    /// Initial page of history in any accepted response shape
    pub fn load_history_json(&mut self, payload: serde_json::Value) -> AppResult<usize> {
        let points = normalize_value(payload, self.store.trading_hours(), self.store.interval())?;
        Ok(self.load_history(points))
    }

    pub fn ingest_live(&mut self, points: Vec<Candle>) -> usize {
        let accepted = self.store.ingest(points);
        if accepted > 0 {
            self.refresh(false);
        }
        accepted
    }

    pub fn apply_tick(&mut self, ts: Timestamp, ltp: f64, volume: f64) -> bool {
        let applied = self.store.apply_tick(ts, ltp, volume);
        if applied {
            self.refresh(false);
        }
        applied
    }

    pub fn set_chart_style(&mut self, style: ChartStyle) {
        if self.style != style {
            self.style = style;
            self.refresh(true);
        }
    }

    /// Pane drag/zoom entry point. Returns the broadcast for the other panes
    /// and restarts the debounce.
    pub fn set_viewport(&mut self, source: ChartPane, viewport: Option<Viewport>, now_ms: f64) -> ViewportBroadcast {
        let broadcast = self.sync.on_relayout(source, viewport, now_ms);
        self.snapshot = Arc::new(ChartSnapshot { viewport, ..(*self.snapshot).clone() });
        self.dispatcher.publish_chart_event(ChartEvent::ViewportBroadcast {
            source: broadcast.source,
            viewport: broadcast.viewport,
            targets: broadcast.targets.clone(),
        });
        broadcast
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.sync.next_deadline()
    }

    /// Advances the debounce. Once settled, runs gap detection and returns
    /// the batch to drive when anything needs fetching.
    pub fn poll(&mut self, now_ms: f64) -> Option<BackfillJob> {
        let viewport = self.sync.poll(now_ms)?;
        let Some(instrument) = self.store.instrument().cloned() else {
            self.settle_without_fetch();
            return None;
        };

        let series = self.store.series();
        let Some(gaps) = self.detector.detect(&viewport, &series, self.store.interval()) else {
            log_debug!(LogComponent::Application("ChartSession"), "viewport covered");
            self.settle_without_fetch();
            return None;
        };
        self.dispatcher.publish_chart_event(ChartEvent::GapsDetected { gaps: gaps.clone() });

        let planned = self.fetcher.plan(&gaps);
        if planned.is_empty() {
            self.settle_without_fetch();
            return None;
        }

        let token = self.sync.begin_fetch();
        let future = self.fetcher.prepare(&instrument, self.store.interval(), &planned, &token).boxed_local();
        if self.loading.show(now_ms) {
            self.dispatcher.publish_chart_event(ChartEvent::LoadingChanged { visible: true });
            self.set_snapshot_loading(true);
        }
        Some(BackfillJob { generation: token.generation(), gaps: planned, future })
    }

    /// Merges a finished batch unless a newer interaction superseded it.
    pub fn complete_backfill(&mut self, outcome: BatchOutcome, now_ms: f64) -> BackfillCompletion {
        if outcome.cancelled || !self.sync.finish(outcome.generation) {
            log_debug!(
                LogComponent::Application("ChartSession"),
                "discarding stale batch {}",
                outcome.generation
            );
            self.dispatcher.publish_chart_event(ChartEvent::BackfillDiscarded { generation: outcome.generation });
            // a superseding round keeps the indicator; an autorange reset leaves nothing pending
            let hide_loading_in_ms = match self.sync.state() {
                SyncState::Idle => self.hide_after_minimum(now_ms),
                _ => None,
            };
            return BackfillCompletion { applied: false, points: 0, hide_loading_in_ms };
        }

        self.fetcher.record(&outcome);
        let points = self.store.ingest(outcome.points);
        self.dispatcher.publish_chart_event(ChartEvent::BackfillApplied { generation: outcome.generation, points });
        if points > 0 {
            self.refresh(false);
        }

        let hide_loading_in_ms = self.hide_after_minimum(now_ms);
        BackfillCompletion { applied: true, points, hide_loading_in_ms }
    }

    fn hide_after_minimum(&mut self, now_ms: f64) -> Option<f64> {
        if !self.loading.visible() {
            return None;
        }
        let remaining = self.loading.remaining(now_ms);
        if remaining > 0.0 {
            Some(remaining)
        } else {
            self.hide_loading(now_ms);
            None
        }
    }

    /// Hides the indicator once its minimum time has passed and no batch is
    /// outstanding. Returns whether it was hidden.
    pub fn hide_loading(&mut self, now_ms: f64) -> bool {
        if self.sync.state() == SyncState::GapChecking || self.loading.remaining(now_ms) > 0.0 {
            return false;
        }
        if self.loading.hide() {
            self.dispatcher.publish_chart_event(ChartEvent::LoadingChanged { visible: false });
            self.set_snapshot_loading(false);
            return true;
        }
        false
    }

    fn settle_without_fetch(&mut self) {
        self.sync.settle();
        if self.loading.hide() {
            self.dispatcher.publish_chart_event(ChartEvent::LoadingChanged { visible: false });
            self.set_snapshot_loading(false);
        }
    }

    fn set_snapshot_loading(&mut self, loading: bool) {
        self.snapshot = Arc::new(ChartSnapshot { loading, ..(*self.snapshot).clone() });
    }

    /// Rebuilds display data when the store changed, then notifies subscribers.
    fn refresh(&mut self, force: bool) {
        let series = self.store.series();
        if !force && series.ptr_eq(&self.snapshot.series) {
            return;
        }
        let display = self.downsampler.reduce(&series);
        let heikin_ashi = (self.style == ChartStyle::HeikinAshi).then(|| HeikinAshi::transform(&display));
        let indicators = Arc::new(IndicatorBundle::compute(&display, &self.config.indicators));

        self.snapshot = Arc::new(ChartSnapshot {
            instrument: self.store.instrument().cloned(),
            interval: self.store.interval(),
            series,
            display,
            heikin_ashi,
            indicators,
            viewport: self.sync.viewport(),
            loading: self.loading.visible(),
        });
        self.dispatcher.publish_chart_event(ChartEvent::SeriesUpdated(Arc::clone(&self.snapshot)));
    }
}
