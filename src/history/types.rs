//! Tier data structures for per-instrument price history
//!
//! A `Series` holds three ascending, non-overlapping tiers:
//! - `detailed` - raw samples from the collector (last 7 days)
//! - `hourly`   - OHLC bars folded from expired samples (last 30 days)
//! - `daily`    - OHLC bars folded from expired hourly bars (unbounded)

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Seconds in one hourly bucket
pub const HOUR_SECS: i64 = 60 * 60;

/// Seconds in one daily bucket (UTC day boundaries)
pub const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Detailed samples older than this are folded into hourly bars
pub const DETAILED_RETENTION_SECS: i64 = 7 * DAY_SECS;

/// Hourly bars older than this are folded into daily bars
pub const HOURLY_RETENTION_SECS: i64 = 30 * DAY_SECS;

/// Retention/resolution level of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Detailed,
    Hourly,
    Daily,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Detailed => "detailed",
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
        }
    }
}

/// One observation from the collector
///
/// `volume` is the trailing 24h volume reported by the source, not a
/// locally accumulated figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
}

/// Hourly OHLC bar
///
/// `count` is the number of detailed samples folded in; `volume` is their
/// arithmetic mean. Backfilled bars may arrive without volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyBar {
    pub period_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub count: u32,
    pub volume: Option<f64>,
}

impl HourlyBar {
    /// Start a new bucket from a single sample
    pub fn from_sample(period_start: i64, sample: &Sample) -> Self {
        Self {
            period_start,
            open: sample.price,
            high: sample.price,
            low: sample.price,
            close: sample.price,
            count: 1,
            volume: Some(sample.volume),
        }
    }
}

/// Daily OHLC bar (volume is not retained at this resolution)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub period_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub count: u32,
}

impl DailyBar {
    /// Start a new bucket from an expired hourly bar
    pub fn from_hourly(period_start: i64, bar: &HourlyBar) -> Self {
        Self {
            period_start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            count: bar.count,
        }
    }

    /// UTC calendar date covered by this bar
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.period_start, 0).map(|dt| dt.date_naive())
    }
}

/// Per-instrument container for all three tiers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub instrument: String,
    pub detailed: Vec<Sample>,
    pub hourly: Vec<HourlyBar>,
    pub daily: Vec<DailyBar>,

    /// Timestamp of the newest accepted sample. Survives compaction so
    /// ordering is still enforced once `detailed` has been drained.
    #[serde(default)]
    pub watermark: Option<i64>,
}

impl Series {
    pub fn new(instrument: String) -> Self {
        Self {
            instrument,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detailed.is_empty() && self.hourly.is_empty() && self.daily.is_empty()
    }

    /// Most recent `limit` entries of `tier`, ascending by time
    pub fn tail(&self, tier: Tier, limit: usize) -> TierEntries {
        fn last_n<T: Copy>(items: &[T], limit: usize) -> Vec<T> {
            let start = items.len().saturating_sub(limit);
            items[start..].to_vec()
        }

        match tier {
            Tier::Detailed => TierEntries::Detailed(last_n(&self.detailed, limit)),
            Tier::Hourly => TierEntries::Hourly(last_n(&self.hourly, limit)),
            Tier::Daily => TierEntries::Daily(last_n(&self.daily, limit)),
        }
    }
}

/// Result of a tier read
#[derive(Debug, Clone, PartialEq)]
pub enum TierEntries {
    Detailed(Vec<Sample>),
    Hourly(Vec<HourlyBar>),
    Daily(Vec<DailyBar>),
}

impl TierEntries {
    pub fn len(&self) -> usize {
        match self {
            TierEntries::Detailed(v) => v.len(),
            TierEntries::Hourly(v) => v.len(),
            TierEntries::Daily(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry timestamps (sample time or bar period start)
    pub fn timestamps(&self) -> Vec<i64> {
        match self {
            TierEntries::Detailed(v) => v.iter().map(|s| s.timestamp).collect(),
            TierEntries::Hourly(v) => v.iter().map(|b| b.period_start).collect(),
            TierEntries::Daily(v) => v.iter().map(|b| b.period_start).collect(),
        }
    }

    /// Closing prices (sample price for the detailed tier)
    pub fn closes(&self) -> Vec<f64> {
        match self {
            TierEntries::Detailed(v) => v.iter().map(|s| s.price).collect(),
            TierEntries::Hourly(v) => v.iter().map(|b| b.close).collect(),
            TierEntries::Daily(v) => v.iter().map(|b| b.close).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, price: f64) -> Sample {
        Sample {
            timestamp,
            price,
            volume: 1.0,
        }
    }

    #[test]
    fn test_tail_returns_most_recent_ascending() {
        let mut series = Series::new("KRW-BTC".to_string());
        for i in 0..5 {
            series.detailed.push(sample(1000 + i * 600, 100.0 + i as f64));
        }

        let entries = series.tail(Tier::Detailed, 3);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries.timestamps(), vec![2200, 2800, 3400]);
        assert_eq!(entries.closes(), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn test_tail_short_history_is_not_an_error() {
        let series = Series::new("KRW-ETH".to_string());

        let entries = series.tail(Tier::Daily, 14);

        assert!(entries.is_empty());
        assert!(matches!(entries, TierEntries::Daily(_)));
    }

    #[test]
    fn test_daily_bar_date() {
        let bar = DailyBar {
            period_start: 1_700_006_400, // 2023-11-15T00:00:00Z
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            count: 1,
        };

        assert_eq!(bar.date(), NaiveDate::from_ymd_opt(2023, 11, 15));
    }
}
