pub use super::value_objects::{OHLCV, Price, Timestamp, Volume};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One bar of the series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub ohlcv: OHLCV,
}

impl Candle {
    pub fn new(timestamp: Timestamp, ohlcv: OHLCV) -> Self {
        Self { timestamp, ohlcv }
    }

    /// Flat bar at a single price, as opened by a live tick
    pub fn flat(timestamp: Timestamp, price: f64, volume: f64) -> Self {
        let p = Price::from(price);
        Self::new(timestamp, OHLCV::new(p, p, p, p, Volume::from(volume)))
    }

    pub fn close(&self) -> f64 {
        self.ohlcv.close.value()
    }
}

/// Ordered, unique-timestamp run of candles behind a shared pointer.
///
/// Clones are cheap and never observe later mutation: every change produces a
/// new allocation, so [`TimeSeries::ptr_eq`] answers "did anything change".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    candles: Arc<Vec<Candle>>,
}

impl TimeSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts and drops repeated timestamps, keeping the last occurrence.
    pub fn from_unsorted(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match out.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => out.push(candle),
            }
        }
        Self { candles: Arc::new(out) }
    }

    /// Caller guarantees strictly increasing timestamps
    pub(crate) fn from_sorted(candles: Vec<Candle>) -> Self {
        debug_assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { candles: Arc::new(candles) }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(Candle::close).collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.candles, &other.candles)
    }
}

impl From<Vec<Candle>> for TimeSeries {
    fn from(candles: Vec<Candle>) -> Self {
        Self::from_unsorted(candles)
    }
}

impl Serialize for TimeSeries {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.candles.iter())
    }
}
