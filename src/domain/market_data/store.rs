use super::{Candle, InstrumentId, OHLCV, Price, TimeInterval, TimeSeries, Timestamp, TradingHours, Volume};
use crate::domain::chart::TimeRange;
use crate::domain::logging::LogComponent;
use crate::log_debug;
use std::collections::BTreeMap;

/// Combines two series keyed by timestamp.
///
/// On a timestamp collision the existing point wins unless it is a
/// zero-volume placeholder and the incoming one carries volume.
pub fn merge(existing: &TimeSeries, incoming: &[Candle]) -> TimeSeries {
    let mut keyed: BTreeMap<Timestamp, Candle> =
        existing.candles().iter().map(|c| (c.timestamp, *c)).collect();

    for candle in incoming {
        keyed
            .entry(candle.timestamp)
            .and_modify(|current| {
                if current.ohlcv.volume.is_zero() && !candle.ohlcv.volume.is_zero() {
                    *current = *candle;
                }
            })
            .or_insert(*candle);
    }

    TimeSeries::from_sorted(keyed.into_values().collect())
}

/// Canonical dataset for the selected instrument and interval
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    instrument: Option<InstrumentId>,
    interval: TimeInterval,
    hours: TradingHours,
    series: TimeSeries,
}

impl TimeSeriesStore {
    pub fn new(interval: TimeInterval, hours: TradingHours) -> Self {
        Self { instrument: None, interval, hours, series: TimeSeries::empty() }
    }

    /// Clears all points and rebinds to a new instrument / interval.
    pub fn reset(&mut self, instrument: InstrumentId, interval: TimeInterval) {
        log_debug!(
            LogComponent::Domain("TimeSeriesStore"),
            "reset to {} @ {} (dropping {} points)",
            instrument,
            interval,
            self.series.len()
        );
        self.instrument = Some(instrument);
        self.interval = interval;
        self.series = TimeSeries::empty();
    }

    pub fn instrument(&self) -> Option<&InstrumentId> {
        self.instrument.as_ref()
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    pub fn trading_hours(&self) -> &TradingHours {
        &self.hours
    }

    /// Shared read-only view; unchanged stores hand out the same allocation.
    pub fn series(&self) -> TimeSeries {
        self.series.clone()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.series.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.series.last()
    }

    pub fn coverage(&self) -> Option<TimeRange> {
        Some(TimeRange::new(self.first()?.timestamp, self.last()?.timestamp))
    }

    /// Applies the session filter, then merges. Returns how many points
    /// survived the filter.
    pub fn ingest(&mut self, points: Vec<Candle>) -> usize {
        let accepted = self.hours.filter(points, self.interval);
        if accepted.is_empty() {
            return 0;
        }
        self.series = merge(&self.series, &accepted);
        accepted.len()
    }

    /// Folds a last-traded-price tick into the bar that contains it.
    ///
    /// Returns `false` when the tick falls outside the session or predates
    /// the newest bar.
    pub fn apply_tick(&mut self, ts: Timestamp, ltp: f64, volume: f64) -> bool {
        if !ltp.is_finite() || ltp < 0.0 || !volume.is_finite() || volume < 0.0 {
            return false;
        }
        if !self.hours.contains(ts, self.interval) {
            return false;
        }
        let Some(bucket) = self.hours.bucket_start(ts, self.interval) else {
            return false;
        };
        if !self.hours.contains(bucket, self.interval) {
            return false;
        }
        let mut candles = self.series.candles().to_vec();

        match candles.last_mut() {
            Some(last) if last.timestamp == bucket => {
                let o = last.ohlcv;
                last.ohlcv = OHLCV::new(
                    o.open,
                    Price::from(o.high.value().max(ltp)),
                    Price::from(o.low.value().min(ltp)),
                    Price::from(ltp),
                    Volume::from(o.volume.value() + volume),
                );
            }
            Some(last) if last.timestamp > bucket => return false,
            _ => candles.push(Candle::flat(bucket, ltp, volume)),
        }

        self.series = TimeSeries::from_sorted(candles);
        true
    }
}
