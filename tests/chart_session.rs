mod common;

use std::cell::RefCell;
use std::rc::Rc;

use chart_viewport_wasm::application::{ChartSession, SyncState};
use chart_viewport_wasm::domain::chart::{ChartPane, ChartStyle, GapKind, TimeRange, Viewport};
use chart_viewport_wasm::domain::events::{ChartEvent, DomainEvent, EventOutbox};
use chart_viewport_wasm::domain::market_data::{Candle, InstrumentId, TimeInterval, Timestamp};
use chart_viewport_wasm::presentation::{ChartSignals, event_to_json};
use common::{MockTransport, RecordingSleeper, SESSION_10AM, minute_series, payload, test_config};
use futures::executor::block_on;
use leptos::SignalGetUntracked;
use serde_json::json;

type TestSession = ChartSession<MockTransport, RecordingSleeper>;

/// One hour of minute bars from 10:00, and a backend that serves two earlier bars
fn session_with_history() -> (TestSession, Rc<MockTransport>) {
    let body = payload(&[(SESSION_10AM - 600, 95.0, 4.0), (SESSION_10AM - 540, 96.0, 4.0)]);
    let transport = MockTransport::status(200, &body);
    let mut session = ChartSession::new(test_config(), transport.clone(), RecordingSleeper::new()).unwrap();
    session.select(InstrumentId::from("RELIANCE"), TimeInterval::OneMinute);
    session.load_history(history(60));
    (session, transport)
}

fn history(count: usize) -> Vec<Candle> {
    minute_series(SESSION_10AM, count, 60).candles().to_vec()
}

/// Starts an hour before the stored data and ends on its last bar
fn leading_gap_viewport() -> Viewport {
    Viewport::new(Timestamp::new(SESSION_10AM - 3600), Timestamp::new(SESSION_10AM + 3540))
}

fn record_events(session: &mut TestSession) -> Rc<RefCell<Vec<&'static str>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session.subscribe(move |event| sink.borrow_mut().push(event.event_type()));
    seen
}

#[test]
fn settled_viewport_backfills_the_leading_gap() {
    let (mut session, transport) = session_with_history();
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);

    assert!(session.poll(100.0).is_none());
    let job = session.poll(500.0).expect("leading gap should be fetched");
    assert_eq!(job.gaps.len(), 1);
    assert_eq!(job.gaps[0].kind, GapKind::Before);
    assert_eq!(job.gaps[0].start.value(), SESSION_10AM - 3600 - 1800);
    assert!(session.snapshot().loading);

    let outcome = block_on(job.future);
    let done = session.complete_backfill(outcome, 600.0);

    assert!(done.applied);
    assert_eq!(done.points, 2);
    assert_eq!(done.hide_loading_in_ms, Some(400.0));
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(session.store().len(), 62);
    assert_eq!(session.store().first().map(|c| c.timestamp.value()), Some(SESSION_10AM - 600));
    assert_eq!(session.snapshot().series.len(), 62);
    assert_eq!(session.sync_state(), SyncState::Idle);
    assert_eq!(
        session.last_served(),
        Some(TimeRange::new(Timestamp::new(SESSION_10AM - 5400), Timestamp::new(SESSION_10AM)))
    );

    assert!(!session.hide_loading(900.0));
    assert!(session.hide_loading(1000.0));
    assert!(!session.snapshot().loading);
}

#[test]
fn served_range_is_not_fetched_twice() {
    let (mut session, transport) = session_with_history();
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);
    let job = session.poll(500.0).unwrap();
    let outcome = block_on(job.future);
    session.complete_backfill(outcome, 1200.0);

    session.set_viewport(ChartPane::Volume, Some(leading_gap_viewport()), 2000.0);
    assert!(session.poll(2500.0).is_none());
    assert_eq!(session.sync_state(), SyncState::Idle);
    assert_eq!(transport.calls().len(), 1);
}

#[test]
fn result_finished_before_a_new_relayout_is_discarded() {
    let (mut session, _transport) = session_with_history();
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);
    let job = session.poll(500.0).unwrap();
    let outcome = block_on(job.future);
    assert!(!outcome.cancelled);

    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 550.0);
    let done = session.complete_backfill(outcome, 600.0);

    assert!(!done.applied);
    assert_eq!(done.hide_loading_in_ms, None);
    assert_eq!(session.store().len(), 60);
    assert_eq!(session.last_served(), None);
    assert!(session.snapshot().loading);
}

#[test]
fn in_flight_batch_is_aborted_by_a_new_relayout() {
    let (mut session, transport) = session_with_history();
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);
    let job = session.poll(500.0).unwrap();

    session.set_viewport(ChartPane::Price, None, 550.0);
    let outcome = block_on(job.future);
    assert!(outcome.cancelled);
    assert!(transport.calls().is_empty());

    let done = session.complete_backfill(outcome, 600.0);
    assert!(!done.applied);
    assert_eq!(session.store().len(), 60);
    // autorange left nothing pending, so the indicator only waits out its minimum
    assert_eq!(done.hide_loading_in_ms, Some(400.0));
    assert!(session.hide_loading(1000.0));
}

#[test]
fn select_clears_store_and_served_range() {
    let (mut session, _transport) = session_with_history();
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);
    let job = session.poll(500.0).unwrap();
    let outcome = block_on(job.future);
    session.complete_backfill(outcome, 1000.0);
    assert!(session.last_served().is_some());

    session.select(InstrumentId::from("TCS"), TimeInterval::FiveMinutes);

    assert!(session.store().is_empty());
    assert_eq!(session.last_served(), None);
    assert_eq!(session.sync_state(), SyncState::Idle);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.instrument, Some(InstrumentId::from("TCS")));
    assert_eq!(snapshot.interval, TimeInterval::FiveMinutes);
    assert!(snapshot.display.is_empty());
    assert!(!snapshot.loading);
}

#[test]
fn subscribers_see_each_step_in_order() {
    let (mut session, _transport) = session_with_history();
    let seen = record_events(&mut session);

    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);
    let job = session.poll(500.0).unwrap();
    let outcome = block_on(job.future);
    session.complete_backfill(outcome, 1000.0);

    assert_eq!(
        *seen.borrow(),
        vec![
            "ViewportBroadcast",
            "GapsDetected",
            "LoadingChanged",
            "BackfillApplied",
            "SeriesUpdated",
            "LoadingChanged",
        ]
    );
}

#[test]
fn unsubscribed_handlers_stop_receiving() {
    let (mut session, _transport) = session_with_history();
    let seen = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&seen);
    let id = session.subscribe(move |_| *sink.borrow_mut() += 1);

    session.set_viewport(ChartPane::Price, None, 0.0);
    assert!(session.unsubscribe(id));
    session.set_viewport(ChartPane::Price, None, 10.0);

    assert_eq!(*seen.borrow(), 1);
    assert!(!session.unsubscribe(id));
}

#[test]
fn empty_store_never_fetches() {
    let transport = MockTransport::status(200, "[]");
    let mut session = ChartSession::new(test_config(), transport.clone(), RecordingSleeper::new()).unwrap();
    session.select(InstrumentId::from("RELIANCE"), TimeInterval::OneMinute);
    session.set_viewport(ChartPane::Price, Some(leading_gap_viewport()), 0.0);

    assert!(session.poll(500.0).is_none());
    assert_eq!(session.sync_state(), SyncState::Idle);
    assert!(transport.calls().is_empty());
}

#[test]
fn ticks_update_the_last_bar_or_open_a_new_one() {
    let transport = MockTransport::status(200, "[]");
    let mut session = ChartSession::new(test_config(), transport, RecordingSleeper::new()).unwrap();
    session.select(InstrumentId::from("RELIANCE"), TimeInterval::OneMinute);
    session.load_history(history(3));

    assert!(session.apply_tick(Timestamp::new(SESSION_10AM + 150), 130.0, 5.0));
    let last = *session.store().last().unwrap();
    assert_eq!(last.timestamp.value(), SESSION_10AM + 120);
    assert_eq!(last.close(), 130.0);
    assert_eq!(last.ohlcv.high.value(), 130.0);
    assert_eq!(last.ohlcv.volume.value(), 15.0);

    assert!(session.apply_tick(Timestamp::new(SESSION_10AM + 185), 131.0, 1.0));
    assert_eq!(session.store().len(), 4);
    assert_eq!(session.store().last().map(|c| c.timestamp.value()), Some(SESSION_10AM + 180));

    assert!(!session.apply_tick(Timestamp::new(SESSION_10AM + 30), 99.0, 1.0));
    assert_eq!(session.snapshot().series.len(), 4);
}

#[test]
fn display_series_is_downsampled_with_aligned_indicators() {
    let config = chart_viewport_wasm::application::EngineConfig { max_visible_points: 10, ..test_config() };
    let mut session = ChartSession::new(config, MockTransport::status(200, "[]"), RecordingSleeper::new()).unwrap();
    session.select(InstrumentId::from("RELIANCE"), TimeInterval::OneMinute);
    session.load_history(history(100));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.series.len(), 100);
    assert_eq!(snapshot.display.len(), 10);
    assert!(snapshot.indicators.sma.iter().all(|(_, s)| s.is_empty() || s.len() == 10));
    assert!(snapshot.indicators.rsi.as_ref().is_some_and(Vec::is_empty));
}

#[test]
fn heikin_ashi_style_adds_a_transformed_series() {
    let (mut session, _transport) = session_with_history();
    assert_eq!(session.snapshot().style(), ChartStyle::Candlestick);

    session.set_chart_style(ChartStyle::HeikinAshi);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.style(), ChartStyle::HeikinAshi);
    assert_eq!(snapshot.price_series().len(), snapshot.display.len());
    assert!(!snapshot.price_series().ptr_eq(&snapshot.display));
}

#[test]
fn history_accepts_wrapped_json() {
    let mut session =
        ChartSession::new(test_config(), MockTransport::status(200, "[]"), RecordingSleeper::new()).unwrap();
    session.select(InstrumentId::from("RELIANCE"), TimeInterval::OneMinute);

    let body = json!({ "results": [
        { "time": SESSION_10AM, "o": 1, "h": 2, "l": 1, "c": 2, "v": 10 },
        { "time": SESSION_10AM + 60, "o": 2, "h": 3, "l": 2, "c": 3, "v": 10 },
    ]});
    assert_eq!(session.load_history_json(body).unwrap(), 2);
    assert!(session.load_history_json(json!({ "error": "nope" })).is_err());
    assert_eq!(session.store().len(), 2);
}

#[test]
fn signals_mirror_session_events() {
    let (mut session, _transport) = session_with_history();
    let signals = ChartSignals::new();
    signals.connect(&mut session);

    session.select(InstrumentId::from("INFY"), TimeInterval::FiveMinutes);
    assert_eq!(signals.interval.get_untracked(), TimeInterval::FiveMinutes);
    assert_eq!(signals.candle_count.get_untracked(), 0);

    session.load_history(minute_series(SESSION_10AM, 12, 300).candles().to_vec());
    assert_eq!(signals.candle_count.get_untracked(), 12);

    let viewport = Viewport::new(Timestamp::new(SESSION_10AM - 3600), Timestamp::new(SESSION_10AM + 3300));
    session.set_viewport(ChartPane::Price, Some(viewport), 0.0);
    assert_eq!(signals.viewport.get_untracked(), Some(viewport));

    let job = session.poll(500.0).unwrap();
    assert!(signals.loading.get_untracked());
    assert_eq!(signals.pending_gaps.get_untracked().len(), 1);

    let outcome = block_on(job.future);
    session.complete_backfill(outcome, 1000.0);
    assert!(signals.pending_gaps.get_untracked().is_empty());
    assert!(!signals.loading.get_untracked());
}

#[test]
fn events_serialize_with_type_and_payload() {
    let event = ChartEvent::LoadingChanged { visible: true };
    assert_eq!(event_to_json(&event), json!({ "type": "LoadingChanged", "payload": { "visible": true } }));

    let reset = ChartEvent::StoreReset { instrument: InstrumentId::from("TCS"), interval: TimeInterval::OneHour };
    assert_eq!(
        event_to_json(&reset),
        json!({ "type": "StoreReset", "payload": { "instrument": "TCS", "interval": "1h" } })
    );
}

#[test]
fn snapshot_events_serialize_with_indicators() {
    let (session, _) = session_with_history();
    let value = event_to_json(&ChartEvent::SeriesUpdated(session.snapshot()));

    assert_eq!(value["type"], "SeriesUpdated");
    let payload = &value["payload"];
    assert_eq!(payload["instrument"], "RELIANCE");
    assert_eq!(payload["interval"], "1m");
    assert_eq!(payload["loading"], false);
    assert!(payload["indicators"].is_object());
    assert!(payload.get("series").is_none());
}

#[test]
fn outbox_handlers_can_call_back_into_the_session() {
    let (session, _) = session_with_history();
    let shared = Rc::new(RefCell::new(session));
    let outbox = EventOutbox::new();
    let mirrored = Rc::new(RefCell::new(Vec::new()));

    let weak = Rc::downgrade(&shared);
    let sink = Rc::clone(&mirrored);
    let handler = outbox.defer(move |event| {
        let ChartEvent::ViewportBroadcast { source: ChartPane::Price, viewport, targets } = event else {
            return;
        };
        let Some(session) = weak.upgrade() else {
            return;
        };
        sink.borrow_mut().push(session.borrow().snapshot().viewport);
        for target in targets {
            session.borrow_mut().set_viewport(*target, *viewport, 10.0);
        }
    });
    shared.borrow_mut().subscribe(handler);

    let viewport = leading_gap_viewport();
    shared.borrow_mut().set_viewport(ChartPane::Price, Some(viewport), 0.0);
    assert!(mirrored.borrow().is_empty());
    assert_eq!(outbox.len(), 1);

    // the Price broadcast, then one from each of the three panes it was mirrored to
    assert_eq!(outbox.flush(), 4);
    assert!(outbox.is_empty());
    assert_eq!(*mirrored.borrow(), vec![Some(viewport)]);
    assert!(matches!(shared.borrow().sync_state(), SyncState::Interacting { .. }));
}
