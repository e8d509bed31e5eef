use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use gloo::timers::callback::Timeout;
use gloo::utils::format::JsValueSerdeExt;
use serde_json::{Value, json};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::application::{BackfillJob, ChartSession, EngineConfig};
use crate::domain::chart::{ChartPane, ChartStyle, Viewport};
use crate::domain::errors::AppError;
use crate::domain::events::{ChartEvent, DomainEvent, EventOutbox, SubscriptionId};
use crate::domain::logging::LogComponent;
use crate::domain::market_data::{InstrumentId, TimeInterval, Timestamp};
use crate::infrastructure::dto::normalize_value;
use crate::infrastructure::http::GlooHttpClient;
use crate::infrastructure::services::{BrowserTimeProvider, GlooSleeper};
use crate::presentation::signals::chart_signals;
use crate::{log_debug, log_warn};

type BrowserSession = ChartSession<GlooHttpClient, GlooSleeper>;

fn to_js_error(err: AppError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// `{ type, payload }` object delivered to JS subscribers
pub fn event_to_json(event: &ChartEvent) -> Value {
    let payload = match event {
        ChartEvent::ViewportBroadcast { source, viewport, targets } => {
            json!({ "source": source, "viewport": viewport, "targets": targets })
        }
        ChartEvent::GapsDetected { gaps } => json!({ "gaps": gaps }),
        ChartEvent::BackfillApplied { generation, points } => {
            json!({ "generation": generation, "points": points })
        }
        ChartEvent::BackfillDiscarded { generation } => json!({ "generation": generation }),
        ChartEvent::LoadingChanged { visible } => json!({ "visible": visible }),
        ChartEvent::StoreReset { instrument, interval } => {
            json!({ "instrument": instrument, "interval": interval })
        }
        ChartEvent::SeriesUpdated(snapshot) => {
            serde_json::to_value(snapshot.as_ref()).unwrap_or(Value::Null)
        }
    };
    json!({ "type": event.event_type(), "payload": payload })
}

/// Browser handle around one chart session. Owns the debounce timer.
///
/// JS subscribers are called from the outbox once the session borrow has
/// been released, so they may call back into the engine.
#[wasm_bindgen]
pub struct ChartViewportEngine {
    session: Rc<RefCell<BrowserSession>>,
    debounce: Rc<RefCell<Option<Timeout>>>,
    outbox: EventOutbox,
}

#[wasm_bindgen]
impl ChartViewportEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<ChartViewportEngine, JsValue> {
        let config = match config_json {
            Some(raw) => EngineConfig::from_json(&raw).map_err(to_js_error)?,
            None => EngineConfig::default(),
        };
        let session = ChartSession::new(config, Rc::new(GlooHttpClient::new()), Rc::new(GlooSleeper))
            .map_err(to_js_error)?;
        Ok(Self {
            session: Rc::new(RefCell::new(session)),
            debounce: Rc::new(RefCell::new(None)),
            outbox: EventOutbox::new(),
        })
    }

    #[wasm_bindgen(js_name = selectInstrument)]
    pub fn select_instrument(&self, instrument_id: String, interval: String) -> Result<(), JsValue> {
        let instrument = InstrumentId::new(instrument_id).map_err(|e| JsValue::from_str(&e))?;
        let interval = TimeInterval::from_str(&interval)
            .map_err(|_| JsValue::from_str(&format!("unsupported interval '{}'", interval)))?;
        self.debounce.borrow_mut().take();
        self.with_session(|session| session.select(instrument, interval));
        Ok(())
    }

    /// Accepts any supported response shape. Returns the number of points kept.
    #[wasm_bindgen(js_name = loadHistory)]
    pub fn load_history(&self, payload: JsValue) -> Result<usize, JsValue> {
        let value: Value = payload.into_serde().map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.with_session(|session| session.load_history_json(value)).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = ingestLive)]
    pub fn ingest_live(&self, payload: JsValue) -> Result<usize, JsValue> {
        let value: Value = payload.into_serde().map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.with_session(|session| -> Result<usize, AppError> {
            let store = session.store();
            let points = normalize_value(value, store.trading_hours(), store.interval())?;
            Ok(session.ingest_live(points))
        })
        .map_err(to_js_error)
    }

    /// Live last-traded-price tick; `timestamp` in epoch seconds
    #[wasm_bindgen(js_name = applyTick)]
    pub fn apply_tick(&self, timestamp: f64, ltp: f64, volume: Option<f64>) -> bool {
        let ts = Timestamp::new(timestamp as i64);
        self.with_session(|session| session.apply_tick(ts, ltp, volume.unwrap_or(0.0)))
    }

    /// Pane relayout with epoch-second bounds. Returns the broadcast for
    /// the sibling panes.
    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(
        &self,
        pane: String,
        start: f64,
        end: f64,
        price_min: Option<f64>,
        price_max: Option<f64>,
    ) -> Result<JsValue, JsValue> {
        if !start.is_finite() || !end.is_finite() {
            return Err(JsValue::from_str("viewport bounds must be finite"));
        }
        let mut viewport = Viewport::new(Timestamp::new(start as i64), Timestamp::new(end as i64));
        if let (Some(min), Some(max)) = (price_min, price_max) {
            viewport = viewport.with_prices(min, max);
        }
        self.relayout(&pane, Some(viewport))
    }

    /// Autorange on a pane: broadcast without a gap check
    #[wasm_bindgen(js_name = resetViewport)]
    pub fn reset_viewport(&self, pane: String) -> Result<JsValue, JsValue> {
        self.relayout(&pane, None)
    }

    #[wasm_bindgen(js_name = setChartStyle)]
    pub fn set_chart_style(&self, style: String) -> Result<(), JsValue> {
        let style = ChartStyle::from_str(&style)
            .map_err(|_| JsValue::from_str(&format!("unknown chart style '{}'", style)))?;
        self.with_session(|session| session.set_chart_style(style));
        Ok(())
    }

    /// Handler receives `{ type, payload }` after the call that raised the
    /// event has finished with the session.
    pub fn subscribe(&self, handler: js_sys::Function) -> u32 {
        let deliver = self.outbox.defer(move |event| {
            let Ok(value) = JsValue::from_serde(&event_to_json(event)) else {
                return;
            };
            if let Err(err) = handler.call1(&JsValue::NULL, &value) {
                log_warn!(
                    LogComponent::Presentation("ChartViewportEngine"),
                    "subscriber threw: {:?}",
                    err
                );
            }
        });
        self.session.borrow_mut().subscribe(deliver).raw()
    }

    pub fn unsubscribe(&self, id: u32) -> bool {
        self.session.borrow_mut().unsubscribe(SubscriptionId::from_raw(id))
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.session.borrow().snapshot();
        JsValue::from_serde(snapshot.as_ref()).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

impl ChartViewportEngine {
    /// Feeds the process-wide Leptos signals from this engine
    pub fn connect_signals(&self) -> SubscriptionId {
        let mut session = self.session.borrow_mut();
        chart_signals().connect(&mut *session)
    }

    /// Runs `f` against the session, then delivers whatever it published.
    fn with_session<R>(&self, f: impl FnOnce(&mut BrowserSession) -> R) -> R {
        let result = f(&mut self.session.borrow_mut());
        self.outbox.flush();
        result
    }

    fn relayout(&self, pane: &str, viewport: Option<Viewport>) -> Result<JsValue, JsValue> {
        let source = ChartPane::from_str(pane)
            .map_err(|_| JsValue::from_str(&format!("unknown pane '{}'", pane)))?;
        let now = BrowserTimeProvider::now_ms();
        let broadcast = self.with_session(|session| session.set_viewport(source, viewport, now));
        schedule_poll(Rc::clone(&self.session), Rc::clone(&self.debounce), self.outbox.clone());
        JsValue::from_serde(&broadcast).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

/// Replaces the pending debounce timer with one aimed at the session's
/// current deadline. Dropping the old `Timeout` cancels it.
fn schedule_poll(
    session: Rc<RefCell<BrowserSession>>,
    slot: Rc<RefCell<Option<Timeout>>>,
    outbox: EventOutbox,
) {
    let Some(deadline) = session.borrow().next_deadline() else {
        slot.borrow_mut().take();
        return;
    };
    let delay = (deadline - BrowserTimeProvider::now_ms()).max(0.0).ceil() as u32;
    let timer_session = Rc::clone(&session);
    let timer_slot = Rc::clone(&slot);
    let timeout = Timeout::new(delay, move || {
        timer_slot.borrow_mut().take();
        let job = timer_session.borrow_mut().poll(BrowserTimeProvider::now_ms());
        outbox.flush();
        match job {
            Some(job) => run_backfill(timer_session, job, outbox),
            None => schedule_poll(timer_session, timer_slot, outbox),
        }
    });
    *slot.borrow_mut() = Some(timeout);
}

fn run_backfill(session: Rc<RefCell<BrowserSession>>, job: BackfillJob, outbox: EventOutbox) {
    log_debug!(
        LogComponent::Presentation("ChartViewportEngine"),
        "backfill {} for {} gaps",
        job.generation,
        job.gaps.len()
    );
    spawn_local(async move {
        let outcome = job.future.await;
        let completion = session.borrow_mut().complete_backfill(outcome, BrowserTimeProvider::now_ms());
        outbox.flush();
        if let Some(wait) = completion.hide_loading_in_ms {
            Timeout::new(wait.ceil() as u32, move || {
                session.borrow_mut().hide_loading(BrowserTimeProvider::now_ms());
                outbox.flush();
            })
            .forget();
        }
    });
}
