//! Relative Strength Index per tier
//!
//! Simple averages of gains and losses over the window (not Wilder
//! smoothing), recomputed from the store on every call:
//!
//! ```text
//! RS  = avg_gain / avg_loss
//! RSI = 100 - 100 / (1 + RS)        (avg_loss == 0 → 100)
//! ```
//!
//! Daily RSI tolerates short histories: with at least 6 daily bars it uses
//! `min(len - 1, period)` as the effective period.

use crate::history::{SeriesStore, Tier};
use serde::Serialize;

/// Default RSI lookback
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Minimum daily bars before a daily RSI is reported
pub const MIN_DAILY_ENTRIES: usize = 6;

/// RSI over the last `period + 1` prices of `prices` (oldest first)
///
/// Returns `None` when fewer than `period + 1` prices are available.
pub fn rsi_from_closes(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    Some((rsi * 100.0).round() / 100.0)
}

/// RSI of `instrument` on `tier`, `None` on insufficient history
pub fn rsi(store: &SeriesStore, instrument: &str, tier: Tier, period: usize) -> Option<f64> {
    let closes = store.read(instrument, tier, period + 1).closes();

    match tier {
        Tier::Detailed | Tier::Hourly => rsi_from_closes(&closes, period),
        Tier::Daily => {
            if closes.len() < MIN_DAILY_ENTRIES {
                return None;
            }
            let actual_period = (closes.len() - 1).min(period);
            rsi_from_closes(&closes, actual_period)
        }
    }
}

/// RSI on all three tiers at the default period
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RsiSnapshot {
    pub detailed: Option<f64>,
    pub hourly: Option<f64>,
    pub daily: Option<f64>,
}

pub fn rsi_snapshot(store: &SeriesStore, instrument: &str) -> RsiSnapshot {
    RsiSnapshot {
        detailed: rsi(store, instrument, Tier::Detailed, DEFAULT_RSI_PERIOD),
        hourly: rsi(store, instrument, Tier::Hourly, DEFAULT_RSI_PERIOD),
        daily: rsi(store, instrument, Tier::Daily, DEFAULT_RSI_PERIOD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{DailyBar, HourlyBar, InMemorySeriesRepository};
    use std::sync::Arc;

    const BASE: i64 = 1_700_006_400;
    const DAY: i64 = 86_400;
    const HOUR: i64 = 3_600;

    fn store_at(now: i64) -> SeriesStore {
        SeriesStore::new_with_timestamp_fn(
            Arc::new(InMemorySeriesRepository::new()),
            Box::new(move || now),
        )
    }

    fn daily_bars(closes: &[f64]) -> Vec<DailyBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| DailyBar {
                period_start: BASE + i as i64 * DAY,
                open: close,
                high: close,
                low: close,
                close,
                count: 1,
            })
            .collect()
    }

    #[test]
    fn test_all_gains_is_100() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi_from_closes(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_all_losses_is_0() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi_from_closes(&prices, 14), Some(0.0));
    }

    #[test]
    fn test_flat_prices_are_100() {
        assert_eq!(rsi_from_closes(&[5.0; 15], 14), Some(100.0));

        let store = store_at(BASE);
        for i in 0..15 {
            store.append_sample("KRW-BTC", BASE + i * 600, 5.0, 1.0).unwrap();
        }
        assert_eq!(rsi(&store, "KRW-BTC", Tier::Detailed, 14), Some(100.0));
    }

    #[test]
    fn test_simple_average_value() {
        // Alternating +2 / -1 over 14 changes: avg_gain = 1.0, avg_loss = 0.5
        let mut prices = vec![100.0];
        for i in 0..14 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }

        assert_eq!(rsi_from_closes(&prices, 14), Some(66.67));
    }

    #[test]
    fn test_uses_only_trailing_window() {
        // Early crash is outside the 3-change window
        let prices = [500.0, 100.0, 101.0, 102.0, 103.0];
        assert_eq!(rsi_from_closes(&prices, 3), Some(100.0));
    }

    #[test]
    fn test_insufficient_prices() {
        assert_eq!(rsi_from_closes(&[1.0; 14], 14), None);
        assert_eq!(rsi_from_closes(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_daily_needs_six_bars() {
        let now = BASE + 10 * DAY;
        let store = store_at(now);
        store
            .load_historical("KRW-BTC", daily_bars(&[10.0, 11.0, 12.0, 11.0, 13.0]), vec![])
            .unwrap();

        assert_eq!(rsi(&store, "KRW-BTC", Tier::Daily, 14), None);
    }

    #[test]
    fn test_daily_shrinks_period_on_short_history() {
        let now = BASE + 10 * DAY;
        let store = store_at(now);
        let closes = [10.0, 11.0, 12.0, 11.0, 13.0, 14.0];
        store
            .load_historical("KRW-BTC", daily_bars(&closes), vec![])
            .unwrap();

        // 5 changes: gains 1+1+2+1 = 5, losses 1 → RS = 5
        let expected = rsi_from_closes(&closes, 5);
        assert_eq!(rsi(&store, "KRW-BTC", Tier::Daily, 14), expected);
        assert_eq!(expected, Some(83.33));
    }

    #[test]
    fn test_hourly_requires_full_window() {
        let now = BASE + 2 * DAY;
        let store = store_at(now);
        let bars: Vec<HourlyBar> = (0..14)
            .map(|i| {
                let close = 1.0 + i as f64;
                HourlyBar {
                    period_start: now - (14 - i) * HOUR,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    count: 1,
                    volume: None,
                }
            })
            .collect();
        store.load_historical("KRW-BTC", vec![], bars).unwrap();

        assert_eq!(rsi(&store, "KRW-BTC", Tier::Hourly, 14), None);
        assert_eq!(rsi(&store, "KRW-BTC", Tier::Hourly, 13), Some(100.0));
    }

    #[test]
    fn test_snapshot_for_unknown_instrument() {
        let store = store_at(BASE);
        let snapshot = rsi_snapshot(&store, "KRW-NOPE");

        assert_eq!(
            snapshot,
            RsiSnapshot {
                detailed: None,
                hourly: None,
                daily: None
            }
        );
    }
}
