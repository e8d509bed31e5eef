use serde::{Deserialize, Serialize};

use crate::domain::chart::{ChartPane, ChartStyle, GapDetector};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::market_data::{Downsampler, IndicatorConfig, TradingHours};

/// Engine settings; every field has a default so partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub api_base_url: String,
    pub exchange: String,
    pub debounce_ms: u64,
    pub gap_buffer_secs: i64,
    pub internal_gap_factor: i64,
    pub max_visible_points: usize,
    pub rate_limit_backoff_ms: u64,
    pub min_loading_ms: u64,
    pub linked_panes: Vec<ChartPane>,
    pub chart_style: ChartStyle,
    pub trading_hours: TradingHours,
    pub indicators: IndicatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            exchange: "NSE".to_string(),
            debounce_ms: 500,
            gap_buffer_secs: 30 * 60,
            internal_gap_factor: 3,
            max_visible_points: 2000,
            rate_limit_backoff_ms: 1000,
            min_loading_ms: 500,
            linked_panes: ChartPane::all(),
            chart_style: ChartStyle::Candlestick,
            trading_hours: TradingHours::nse(),
            indicators: IndicatorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::Configuration(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.exchange.trim().is_empty() {
            return Err(AppError::Configuration("exchange must not be empty".to_string()));
        }
        if self.debounce_ms == 0 {
            return Err(AppError::Configuration("debounceMs must be positive".to_string()));
        }
        if self.gap_buffer_secs < 0 {
            return Err(AppError::Configuration("gapBufferSecs must not be negative".to_string()));
        }
        if self.internal_gap_factor < 1 {
            return Err(AppError::Configuration("internalGapFactor must be at least 1".to_string()));
        }
        self.trading_hours.validate().map_err(AppError::Configuration)?;

        let ind = &self.indicators;
        if ind.sma_periods.iter().chain(&ind.ema_periods).any(|p| *p == 0) {
            return Err(AppError::Configuration("moving average periods must be positive".to_string()));
        }
        if let Some(macd) = ind.macd {
            if macd.fast == 0 || macd.signal == 0 || macd.fast >= macd.slow {
                return Err(AppError::Configuration(format!(
                    "macd periods {}/{}/{} are inconsistent",
                    macd.fast, macd.slow, macd.signal
                )));
            }
        }
        Ok(())
    }

    pub fn gap_detector(&self) -> GapDetector {
        GapDetector::new(self.gap_buffer_secs, self.internal_gap_factor)
    }

    pub fn downsampler(&self) -> Downsampler {
        Downsampler::new(self.max_visible_points)
    }
}
