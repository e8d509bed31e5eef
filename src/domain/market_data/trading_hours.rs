use super::{Candle, TimeInterval, Timestamp};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Exchange session policy applied to every point entering the store.
///
/// Minutes are counted from local midnight; both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TradingHours {
    #[serde(with = "hhmm")]
    pub open: u32,
    #[serde(with = "hhmm")]
    pub close: u32,
    pub utc_offset_minutes: i32,
    pub holidays: Vec<NaiveDate>,
    pub enabled: bool,
}

impl Default for TradingHours {
    fn default() -> Self {
        Self::nse()
    }
}

impl TradingHours {
    /// 09:15 to 15:30 IST, Monday to Friday
    pub fn nse() -> Self {
        Self {
            open: 9 * 60 + 15,
            close: 15 * 60 + 30,
            utc_offset_minutes: 330,
            holidays: Vec::new(),
            enabled: true,
        }
    }

    pub fn always_open() -> Self {
        Self { enabled: false, ..Self::nse() }
    }

    /// Exchange-local wall clock for an epoch-seconds timestamp
    pub fn local_time(&self, ts: Timestamp) -> Option<NaiveDateTime> {
        let shifted = ts.value().checked_add(i64::from(self.utc_offset_minutes) * 60)?;
        DateTime::from_timestamp(shifted, 0).map(|dt| dt.naive_utc())
    }

    /// Epoch seconds for an exchange-local wall clock reading
    pub fn to_utc(&self, local: NaiveDateTime) -> Timestamp {
        let secs = local.and_utc().timestamp() - i64::from(self.utc_offset_minutes) * 60;
        Timestamp::new(secs)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Daily bars carry no meaningful time of day, so only the calendar is checked.
    pub fn contains(&self, ts: Timestamp, interval: TimeInterval) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(local) = self.local_time(ts) else {
            return false;
        };
        if !self.is_trading_day(local.date()) {
            return false;
        }
        if interval == TimeInterval::OneDay {
            return true;
        }
        let minute = local.hour() * 60 + local.minute();
        (self.open..=self.close).contains(&minute)
    }

    /// Start of the bar containing `ts`, anchored at the session open in
    /// exchange-local time. Daily bars start at local midnight. Without a
    /// session the plain epoch grid is used.
    pub fn bucket_start(&self, ts: Timestamp, interval: TimeInterval) -> Option<Timestamp> {
        if !self.enabled {
            return Some(interval.bucket_start(ts));
        }
        let local = self.local_time(ts)?;
        if interval == TimeInterval::OneDay {
            return Some(self.to_utc(local.date().and_hms_opt(0, 0, 0)?));
        }
        let minute = local.hour() * 60 + local.minute();
        if minute < self.open {
            return None;
        }
        let width = u32::try_from(interval.duration_secs() / 60).ok()?.max(1);
        let start = self.open + (minute - self.open) / width * width;
        Some(self.to_utc(local.date().and_hms_opt(start / 60, start % 60, 0)?))
    }

    pub fn filter(&self, points: Vec<Candle>, interval: TimeInterval) -> Vec<Candle> {
        points.into_iter().filter(|c| self.contains(c.timestamp, interval)).collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.open > 24 * 60 || self.close > 24 * 60 {
            return Err("session bounds must fall within a day".to_string());
        }
        if self.open >= self.close {
            return Err(format!("session opens at {} but closes at {}", self.open, self.close));
        }
        if self.utc_offset_minutes.abs() > 14 * 60 {
            return Err(format!("utc offset {} out of range", self.utc_offset_minutes));
        }
        Ok(())
    }
}

/// "HH:MM" on the wire, minutes since midnight in memory
mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(minutes: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:02}:{:02}", minutes / 60, minutes % 60))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid HH:MM time '{}'", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<u32> {
        let (h, m) = raw.trim().split_once(':')?;
        let (h, m): (u32, u32) = (h.parse().ok()?, m.parse().ok()?);
        (h < 24 && m < 60).then_some(h * 60 + m)
    }
}
