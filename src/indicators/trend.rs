//! Multi-period price trend summaries
//!
//! A trend window merges every tier that has points inside it: detailed
//! prices, hourly closes, and (for windows longer than a week) daily closes.

use crate::history::SeriesStore;
use serde::Serialize;

const WEEK_HOURS: i64 = 7 * 24;

/// Direction of the last three points in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Upward,
    Downward,
    Sideways,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Upward => "upward",
            TrendDirection::Downward => "downward",
            TrendDirection::Sideways => "sideways",
            TrendDirection::Unknown => "unknown",
        }
    }

    fn from_prices(prices: &[f64]) -> Self {
        if prices.len() < 3 {
            return TrendDirection::Unknown;
        }
        let recent = &prices[prices.len() - 3..];
        if recent[2] > recent[0] {
            TrendDirection::Upward
        } else if recent[2] < recent[0] {
            TrendDirection::Downward
        } else {
            TrendDirection::Sideways
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTrend {
    pub instrument: String,
    pub current_price: f64,
    pub start_price: f64,
    /// Percent change from first to last point, 2 decimals
    pub change_rate: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub direction: TrendDirection,
    /// Population standard deviation as a percent of the mean, 2 decimals
    pub volatility: f64,
    pub data_points: usize,
    pub start_time: i64,
    pub end_time: i64,
}

/// 24h / 72h / 168h trends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiPeriodTrends {
    pub short_term: Option<PriceTrend>,
    pub medium_term: Option<PriceTrend>,
    pub long_term: Option<PriceTrend>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Trend over the `hours` before `now`, `None` when the window is empty
pub fn price_trend(
    store: &SeriesStore,
    instrument: &str,
    hours: i64,
    now: i64,
) -> Option<PriceTrend> {
    let series = store.snapshot(instrument)?;
    let cutoff = now - hours * 3600;

    let mut points: Vec<(i64, f64)> = series
        .detailed
        .iter()
        .filter(|s| s.timestamp > cutoff)
        .map(|s| (s.timestamp, s.price))
        .chain(
            series
                .hourly
                .iter()
                .filter(|b| b.period_start > cutoff)
                .map(|b| (b.period_start, b.close)),
        )
        .collect();

    if hours > WEEK_HOURS {
        points.extend(
            series
                .daily
                .iter()
                .filter(|b| b.period_start > cutoff)
                .map(|b| (b.period_start, b.close)),
        );
    }

    if points.is_empty() {
        return None;
    }
    points.sort_by_key(|(timestamp, _)| *timestamp);

    let prices: Vec<f64> = points.iter().map(|(_, price)| *price).collect();
    let start_price = prices[0];
    let current_price = prices[prices.len() - 1];

    let change_rate = if start_price > 0.0 {
        (current_price - start_price) / start_price * 100.0
    } else {
        0.0
    };

    let max_price = prices.iter().copied().fold(f64::MIN, f64::max);
    let min_price = prices.iter().copied().fold(f64::MAX, f64::min);

    let volatility = if prices.len() > 1 {
        let n = prices.len() as f64;
        let mean = prices.iter().sum::<f64>() / n;
        let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        if mean > 0.0 {
            variance.sqrt() / mean * 100.0
        } else {
            0.0
        }
    } else {
        0.0
    };

    Some(PriceTrend {
        instrument: instrument.to_string(),
        current_price,
        start_price,
        change_rate: round2(change_rate),
        max_price,
        min_price,
        direction: TrendDirection::from_prices(&prices),
        volatility: round2(volatility),
        data_points: points.len(),
        start_time: points[0].0,
        end_time: points[points.len() - 1].0,
    })
}

pub fn multi_period_trends(store: &SeriesStore, instrument: &str, now: i64) -> MultiPeriodTrends {
    MultiPeriodTrends {
        short_term: price_trend(store, instrument, 24, now),
        medium_term: price_trend(store, instrument, 72, now),
        long_term: price_trend(store, instrument, WEEK_HOURS, now),
    }
}

/// Newest detailed volume, falling back to the newest hourly mean volume
pub fn latest_volume(store: &SeriesStore, instrument: &str) -> Option<f64> {
    let series = store.snapshot(instrument)?;
    series
        .detailed
        .last()
        .map(|s| s.volume)
        .or_else(|| series.hourly.last().and_then(|b| b.volume))
}
