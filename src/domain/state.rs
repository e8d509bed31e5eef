use std::sync::Arc;

use serde::Serialize;

use crate::domain::chart::{ChartStyle, Viewport};
use crate::domain::market_data::{IndicatorBundle, InstrumentId, TimeInterval, TimeSeries};

/// Immutable view handed to render surfaces on every change.
///
/// `display` is the downsampled series; indicators are aligned with it.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub instrument: Option<InstrumentId>,
    pub interval: TimeInterval,
    #[serde(skip)]
    pub series: TimeSeries,
    pub display: TimeSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heikin_ashi: Option<TimeSeries>,
    pub indicators: Arc<IndicatorBundle>,
    pub viewport: Option<Viewport>,
    pub loading: bool,
}

impl ChartSnapshot {
    pub fn style(&self) -> ChartStyle {
        if self.heikin_ashi.is_some() { ChartStyle::HeikinAshi } else { ChartStyle::Candlestick }
    }

    /// Series the price pane should draw
    pub fn price_series(&self) -> &TimeSeries {
        self.heikin_ashi.as_ref().unwrap_or(&self.display)
    }
}
