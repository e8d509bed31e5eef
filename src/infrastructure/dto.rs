//! Decoding of backend OHLCV payloads into domain candles.
//!
//! The backend is loose about both the envelope and the point field names, so
//! decoding goes through `serde_json::Value` with a fixed order of shapes and
//! aliases instead of derived structs.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::domain::errors::{AppError, AppResult};
use crate::domain::logging::LogComponent;
use crate::domain::market_data::{
    Candle, DataPointValidator, OHLCV, Price, TimeInterval, Timestamp, TradingHours, Volume,
};
use crate::log_debug;

const TIMESTAMP_KEYS: [&str; 3] = ["interval_start", "timestamp", "time"];
const OPEN_KEYS: [&str; 2] = ["open", "o"];
const HIGH_KEYS: [&str; 2] = ["high", "h"];
const LOW_KEYS: [&str; 2] = ["low", "l"];
const CLOSE_KEYS: [&str; 2] = ["close", "c"];
const VOLUME_KEYS: [&str; 2] = ["volume", "v"];

/// Numbers above this are read as epoch milliseconds
const MILLIS_THRESHOLD: f64 = 1e11;

/// Accepted payload shapes, in the order they are tried
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Bare(Vec<Value>),
    Data(Vec<Value>),
    Results(Vec<Value>),
    Ohlcv(Vec<Value>),
}

impl ResponseEnvelope {
    pub fn decode(value: Value) -> AppResult<Self> {
        let mut object = match value {
            Value::Array(items) => return Ok(Self::Bare(items)),
            Value::Object(object) => object,
            other => {
                return Err(AppError::Decode(format!("unexpected payload type: {}", type_name(&other))));
            }
        };
        let wrappers: [(&str, fn(Vec<Value>) -> Self); 3] =
            [("data", Self::Data), ("results", Self::Results), ("ohlcv", Self::Ohlcv)];
        for (key, wrap) in wrappers {
            if let Some(Value::Array(items)) = object.remove(key) {
                return Ok(wrap(items));
            }
        }
        Err(AppError::Decode("no point array under data/results/ohlcv".to_string()))
    }

    pub fn into_points(self) -> Vec<Value> {
        match self {
            Self::Bare(v) | Self::Data(v) | Self::Results(v) | Self::Ohlcv(v) => v,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First alias that is present and not null
fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| object.get(*k)).find(|v| !v.is_null())
}

/// The single numeric coercion point for incoming data.
///
/// Missing, null and empty-string values become 0. Numeric strings are
/// parsed. Anything else is malformed.
pub fn coerce_number(value: Option<&Value>) -> AppResult<f64> {
    let number = match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| AppError::Decode(format!("non-numeric value '{}'", s)))?,
        Some(other) => {
            return Err(AppError::Decode(format!("expected number, got {}", type_name(other))));
        }
    };
    if number.is_finite() {
        Ok(number)
    } else {
        Err(AppError::Decode("non-finite number".to_string()))
    }
}

fn epoch_number(raw: f64) -> Option<Timestamp> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    if raw > MILLIS_THRESHOLD {
        Some(Timestamp::from_millis(raw as i64))
    } else {
        Some(Timestamp::new(raw as i64))
    }
}

/// Naive strings are read as exchange-local wall clock time.
pub fn parse_timestamp(value: &Value, hours: &TradingHours) -> Option<Timestamp> {
    match value {
        Value::Number(n) => epoch_number(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(raw) = s.parse::<f64>() {
                return epoch_number(raw);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(Timestamp::new(dt.timestamp()));
            }
            const NAIVE_FORMATS: [&str; 4] =
                ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];
            for format in NAIVE_FORMATS {
                if let Ok(local) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(hours.to_utc(local));
                }
            }
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some(hours.to_utc(date.and_hms_opt(0, 0, 0)?))
        }
        _ => None,
    }
}

pub fn normalize_point(raw: &Value, hours: &TradingHours) -> AppResult<Candle> {
    let object = raw
        .as_object()
        .ok_or_else(|| AppError::Decode(format!("point is a {}", type_name(raw))))?;

    let ts_value = lookup(object, &TIMESTAMP_KEYS)
        .ok_or_else(|| AppError::Decode("point has no timestamp".to_string()))?;
    let timestamp = parse_timestamp(ts_value, hours)
        .ok_or_else(|| AppError::Decode(format!("unparseable timestamp {}", ts_value)))?;

    let candle = Candle::new(
        timestamp,
        OHLCV::new(
            Price::from(coerce_number(lookup(object, &OPEN_KEYS))?),
            Price::from(coerce_number(lookup(object, &HIGH_KEYS))?),
            Price::from(coerce_number(lookup(object, &LOW_KEYS))?),
            Price::from(coerce_number(lookup(object, &CLOSE_KEYS))?),
            Volume::from(coerce_number(lookup(object, &VOLUME_KEYS))?),
        ),
    );
    DataPointValidator.validate(&candle)?;
    Ok(candle)
}

/// Decodes a response body. Envelope errors fail the call; bad points are
/// dropped one by one and points outside the session are filtered out.
pub fn normalize_response(
    body: &str,
    hours: &TradingHours,
    interval: TimeInterval,
) -> AppResult<Vec<Candle>> {
    let value: Value = serde_json::from_str(body)?;
    normalize_value(value, hours, interval)
}

pub fn normalize_value(
    value: Value,
    hours: &TradingHours,
    interval: TimeInterval,
) -> AppResult<Vec<Candle>> {
    let points = ResponseEnvelope::decode(value)?.into_points();
    let total = points.len();
    let mut candles = Vec::with_capacity(total);
    let mut dropped = 0usize;
    for raw in &points {
        match normalize_point(raw, hours) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                dropped += 1;
                log_debug!(LogComponent::Infrastructure("Dto"), "dropping point: {}", e);
            }
        }
    }
    let candles = hours.filter(candles, interval);
    log_debug!(
        LogComponent::Infrastructure("Dto"),
        "normalized {}/{} points ({} malformed)",
        candles.len(),
        total,
        dropped
    );
    Ok(candles)
}
