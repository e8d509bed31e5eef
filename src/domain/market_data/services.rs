use super::{Candle, OHLCV, Price, TimeSeries, Volume};
use crate::domain::errors::AppError;

/// Reduces oversized series to a render budget by OHLCV re-bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsampler {
    pub max_points: usize,
}

impl Default for Downsampler {
    fn default() -> Self {
        Self { max_points: 2000 }
    }
}

impl Downsampler {
    pub fn new(max_points: usize) -> Self {
        Self { max_points }
    }

    /// Returns the input allocation when already within budget.
    pub fn reduce(&self, series: &TimeSeries) -> TimeSeries {
        if self.max_points == 0 || series.len() <= self.max_points {
            return series.clone();
        }
        let bucket = series.len().div_ceil(self.max_points);
        let reduced = series.candles().chunks(bucket).filter_map(Self::aggregate).collect();
        TimeSeries::from_sorted(reduced)
    }

    /// One synthetic bar stamped with the bucket's last timestamp
    pub fn aggregate(bucket: &[Candle]) -> Option<Candle> {
        let first = bucket.first()?;
        let last = bucket.last()?;
        let (high, low, volume) = bucket.iter().fold(
            (f64::NEG_INFINITY, f64::INFINITY, 0.0),
            |(high, low, volume), c| {
                (
                    high.max(c.ohlcv.high.value()),
                    low.min(c.ohlcv.low.value()),
                    volume + c.ohlcv.volume.value(),
                )
            },
        );
        Some(Candle::new(
            last.timestamp,
            OHLCV::new(first.ohlcv.open, Price::from(high), Price::from(low), last.ohlcv.close, Volume::from(volume)),
        ))
    }
}

/// Heikin-Ashi smoothing of a candle series
pub struct HeikinAshi;

impl HeikinAshi {
    pub fn transform(series: &TimeSeries) -> TimeSeries {
        let mut out: Vec<Candle> = Vec::with_capacity(series.len());
        for candle in series.candles() {
            let o = candle.ohlcv;
            let ha_close = o.average();
            let ha_open = match out.last() {
                Some(prev) => (prev.ohlcv.open.value() + prev.ohlcv.close.value()) / 2.0,
                None => (o.open.value() + o.close.value()) / 2.0,
            };
            let ha_high = o.high.value().max(ha_open).max(ha_close);
            let ha_low = o.low.value().min(ha_open).min(ha_close);
            out.push(Candle::new(
                candle.timestamp,
                OHLCV::new(ha_open.into(), ha_high.into(), ha_low.into(), ha_close.into(), o.volume),
            ));
        }
        TimeSeries::from_sorted(out)
    }
}

/// Rejects points that break the OHLC envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct DataPointValidator;

impl DataPointValidator {
    pub fn validate(&self, candle: &Candle) -> Result<(), AppError> {
        let o = &candle.ohlcv;
        let fields = [
            ("open", o.open.value()),
            ("high", o.high.value()),
            ("low", o.low.value()),
            ("close", o.close.value()),
            ("volume", o.volume.value()),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(AppError::Validation(format!("{} is not finite", name)));
            }
            if value < 0.0 {
                return Err(AppError::Validation(format!("{} is negative ({})", name, value)));
            }
        }
        if o.high.value() < o.open.value().max(o.close.value()) {
            return Err(AppError::Validation(format!(
                "high {} below body at {}",
                o.high.value(),
                candle.timestamp
            )));
        }
        if o.low.value() > o.open.value().min(o.close.value()) {
            return Err(AppError::Validation(format!(
                "low {} above body at {}",
                o.low.value(),
                candle.timestamp
            )));
        }
        Ok(())
    }
}
