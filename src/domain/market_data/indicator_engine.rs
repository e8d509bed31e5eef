//! Pure indicator functions over a close-price slice.
//!
//! Every output is index-aligned with its input: undefined leading values are
//! `None`. Inputs shorter than the required warm-up yield an empty vector.

use super::TimeSeries;
use serde::{Deserialize, Serialize};

pub type IndicatorSeries = Vec<Option<f64>>;

pub fn sma(prices: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let mut out = vec![None; period - 1];
    let mut sum: f64 = prices[..period].iter().sum();
    out.push(Some(sum / period as f64));
    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        out.push(Some(sum / period as f64));
    }
    out
}

/// Seeded with the SMA of the first `period` prices
pub fn ema(prices: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = vec![None; period - 1];
    let mut prev = prices[..period].iter().sum::<f64>() / period as f64;
    out.push(Some(prev));
    for price in &prices[period..] {
        prev = price * k + prev * (1.0 - k);
        out.push(Some(prev));
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdDevMode {
    /// Divide by `period`
    #[default]
    Population,
    /// Divide by `period - 1`
    Sample,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: IndicatorSeries,
    pub middle: IndicatorSeries,
    pub lower: IndicatorSeries,
}

pub fn bollinger(prices: &[f64], period: usize, multiplier: f64, mode: StdDevMode) -> BollingerBands {
    let min_len = match mode {
        StdDevMode::Population => 1,
        StdDevMode::Sample => 2,
    };
    if period < min_len || prices.len() < period {
        return BollingerBands::default();
    }
    let middle = sma(prices, period);
    let divisor = match mode {
        StdDevMode::Population => period as f64,
        StdDevMode::Sample => (period - 1) as f64,
    };
    let mut upper = Vec::with_capacity(prices.len());
    let mut lower = Vec::with_capacity(prices.len());
    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(mean) => {
                let window = &prices[i + 1 - period..=i];
                let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / divisor;
                let band = multiplier * variance.sqrt();
                upper.push(Some(mean + band));
                lower.push(Some(mean - band));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }
    BollingerBands { upper, middle, lower }
}

/// Wilder's RSI. The first defined value sits at index `period`.
pub fn rsi(prices: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 || prices.len() <= period {
        return Vec::new();
    }
    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;
    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / p;

    let mut out = vec![None; period];
    out.push(Some(rsi_value(avg_gain, avg_loss)));
    for delta in &deltas[period..] {
        avg_gain = (avg_gain * (p - 1.0) + delta.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-delta).max(0.0)) / p;
        out.push(Some(rsi_value(avg_gain, avg_loss)));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MacdSeries {
    pub macd: IndicatorSeries,
    pub signal: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

/// Line is defined from the slow EMA onward; the signal is an EMA over the
/// defined line values only, left-padded back to full length.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() || signal == 0 {
        return MacdSeries::default();
    }

    let line: IndicatorSeries = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let offset = line.iter().position(Option::is_some).unwrap_or(line.len());
    let defined: Vec<f64> = line.iter().flatten().copied().collect();
    let signal_tail = ema(&defined, signal);
    if signal_tail.is_empty() {
        return MacdSeries::default();
    }

    let mut signal_line = vec![None; offset];
    signal_line.extend(signal_tail);

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries { macd: line, signal: signal_line, histogram }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BollingerConfig {
    pub period: usize,
    pub multiplier: f64,
    pub std_dev: StdDevMode,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self { period: 20, multiplier: 2.0, std_dev: StdDevMode::Population }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self { fast: 12, slow: 26, signal: 9 }
    }
}

/// Which indicators to derive and with what parameters. `None` disables one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndicatorConfig {
    pub sma_periods: Vec<usize>,
    pub ema_periods: Vec<usize>,
    pub bollinger: Option<BollingerConfig>,
    pub rsi_period: Option<usize>,
    pub macd: Option<MacdConfig>,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_periods: vec![20, 50],
            ema_periods: vec![9, 21],
            bollinger: Some(BollingerConfig::default()),
            rsi_period: Some(14),
            macd: Some(MacdConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorBundle {
    pub sma: Vec<(usize, IndicatorSeries)>,
    pub ema: Vec<(usize, IndicatorSeries)>,
    pub bollinger: Option<BollingerBands>,
    pub rsi: Option<IndicatorSeries>,
    pub macd: Option<MacdSeries>,
}

impl IndicatorBundle {
    pub fn compute(series: &TimeSeries, config: &IndicatorConfig) -> Self {
        let closes = series.closes();
        Self {
            sma: config.sma_periods.iter().map(|&p| (p, sma(&closes, p))).collect(),
            ema: config.ema_periods.iter().map(|&p| (p, ema(&closes, p))).collect(),
            bollinger: config.bollinger.map(|b| bollinger(&closes, b.period, b.multiplier, b.std_dev)),
            rsi: config.rsi_period.map(|p| rsi(&closes, p)),
            macd: config.macd.map(|m| macd(&closes, m.fast, m.slow, m.signal)),
        }
    }
}
