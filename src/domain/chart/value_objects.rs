use crate::domain::market_data::Timestamp;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

/// Linked chart surfaces sharing one time axis
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChartPane {
    #[display(fmt = "Price")]
    Price,
    #[display(fmt = "Volume")]
    Volume,
    #[display(fmt = "RSI")]
    Rsi,
    #[display(fmt = "MACD")]
    Macd,
}

impl ChartPane {
    pub fn all() -> Vec<ChartPane> {
        ChartPane::iter().collect()
    }
}

/// How the price pane draws bars
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartStyle {
    #[default]
    #[strum(serialize = "candlestick")]
    Candlestick,
    #[strum(serialize = "heikinAshi")]
    HeikinAshi,
}

/// Closed range of epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Bounds are swapped if given out of order.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        if start <= end { Self { start, end } } else { Self { start: end, end: start } }
    }

    pub fn contains_range(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn hull(&self, other: &TimeRange) -> TimeRange {
        TimeRange { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end.value() - self.start.value()
    }
}

/// Visible window shared by all linked panes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub visible_start: Timestamp,
    pub visible_end: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
}

impl Viewport {
    pub fn new(visible_start: Timestamp, visible_end: Timestamp) -> Self {
        let range = TimeRange::new(visible_start, visible_end);
        Self { visible_start: range.start, visible_end: range.end, price_min: None, price_max: None }
    }

    pub fn with_prices(mut self, price_min: f64, price_max: f64) -> Self {
        if price_min.is_finite() && price_max.is_finite() {
            self.price_min = Some(price_min.min(price_max));
            self.price_max = Some(price_min.max(price_max));
        }
        self
    }

    /// Same window without a price axis, as broadcast to panes with their own scale
    pub fn time_only(&self) -> Self {
        Self { price_min: None, price_max: None, ..*self }
    }
}
