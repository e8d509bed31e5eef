#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chart_viewport_wasm::application::{EngineConfig, Sleeper};
use chart_viewport_wasm::domain::errors::{AppError, AppResult};
use chart_viewport_wasm::domain::market_data::{
    Candle, OHLCV, Price, TimeSeries, Timestamp, TradingHours, Volume,
};
use chart_viewport_wasm::infrastructure::http::{HttpResponse, OhlcvTransport};

/// 2024-01-02 (Tuesday) 10:00 IST
pub const SESSION_10AM: i64 = 1_704_169_800;

pub fn bar(ts: i64, close: f64, volume: f64) -> Candle {
    Candle::new(
        Timestamp::new(ts),
        OHLCV::new(
            Price::from(close),
            Price::from(close + 1.0),
            Price::from((close - 1.0).max(0.0)),
            Price::from(close),
            Volume::from(volume),
        ),
    )
}

pub fn ohlc(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
    Candle::new(Timestamp::new(ts), OHLCV::new(o.into(), h.into(), l.into(), c.into(), v.into()))
}

/// One bar per `step` seconds starting at `start`
pub fn minute_series(start: i64, count: usize, step: i64) -> TimeSeries {
    TimeSeries::from(
        (0..count).map(|i| bar(start + i as i64 * step, 100.0 + i as f64, 10.0)).collect::<Vec<_>>(),
    )
}

/// Config with the session filter off and a fixed backend address
pub fn test_config() -> EngineConfig {
    EngineConfig {
        api_base_url: "https://api.test".to_string(),
        trading_hours: TradingHours::always_open(),
        ..EngineConfig::default()
    }
}

type Responder = Box<dyn Fn(&str) -> AppResult<HttpResponse>>;

/// Transport that answers from a closure and records every URL
pub struct MockTransport {
    responder: Responder,
    calls: RefCell<Vec<String>>,
}

impl MockTransport {
    pub fn new(responder: impl Fn(&str) -> AppResult<HttpResponse> + 'static) -> Rc<Self> {
        Rc::new(Self { responder: Box::new(responder), calls: RefCell::new(Vec::new()) })
    }

    pub fn status(status: u16, body: &str) -> Rc<Self> {
        let body = body.to_string();
        Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    pub fn failing() -> Rc<Self> {
        Self::new(|url| Err(AppError::Network(format!("connection reset for {}", url))))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl OhlcvTransport for MockTransport {
    async fn get(&self, url: &str) -> AppResult<HttpResponse> {
        self.calls.borrow_mut().push(url.to_string());
        (self.responder)(url)
    }
}

/// Records requested waits and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

/// Bare-array payload with canonical field names
pub fn payload(points: &[(i64, f64, f64)]) -> String {
    let items: Vec<serde_json::Value> = points
        .iter()
        .map(|(ts, close, volume)| {
            serde_json::json!({
                "interval_start": ts,
                "open": close,
                "high": close + 1.0,
                "low": close - 1.0,
                "close": close,
                "volume": volume,
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}
