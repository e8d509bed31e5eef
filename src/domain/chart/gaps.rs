use super::{TimeRange, Viewport};
use crate::domain::market_data::{TimeInterval, TimeSeries, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Before,
    After,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapPriority {
    High,
    Medium,
}

/// A time range the store does not cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub kind: GapKind,
    pub start: Timestamp,
    pub end: Timestamp,
    pub priority: GapPriority,
}

impl Gap {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Compares a settled viewport against what the store holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapDetector {
    /// Padding applied outward to edge gaps
    pub buffer_secs: i64,
    /// Consecutive points further apart than `factor × interval` form an internal gap
    pub continuity_factor: i64,
}

impl Default for GapDetector {
    fn default() -> Self {
        Self { buffer_secs: 30 * 60, continuity_factor: 3 }
    }
}

impl GapDetector {
    pub fn new(buffer_secs: i64, continuity_factor: i64) -> Self {
        Self { buffer_secs, continuity_factor }
    }

    /// `None` for an empty series or when nothing is missing.
    pub fn detect(
        &self,
        viewport: &Viewport,
        series: &TimeSeries,
        interval: TimeInterval,
    ) -> Option<Vec<Gap>> {
        let first = series.first()?.timestamp;
        let last = series.last()?.timestamp;
        let mut gaps = Vec::new();

        if viewport.visible_start < first {
            gaps.push(Gap {
                kind: GapKind::Before,
                start: viewport.visible_start.offset(-self.buffer_secs),
                end: first,
                priority: GapPriority::High,
            });
        }

        if viewport.visible_end > last {
            gaps.push(Gap {
                kind: GapKind::After,
                start: last,
                end: viewport.visible_end.offset(self.buffer_secs),
                priority: GapPriority::High,
            });
        }

        let step = interval.duration_secs();
        let threshold = step * self.continuity_factor;
        for pair in series.candles().windows(2) {
            let (prev, cur) = (pair[0].timestamp, pair[1].timestamp);
            if cur.value() - prev.value() > threshold {
                gaps.push(Gap {
                    kind: GapKind::Internal,
                    start: prev.offset(step),
                    end: cur.offset(-step),
                    priority: GapPriority::Medium,
                });
            }
        }

        (!gaps.is_empty()).then_some(gaps)
    }
}
