//! Cascading compaction: detailed → hourly → daily
//!
//! Every append re-drives compaction from the current tier contents, so a
//! pass that failed on a corrupt bucket is retried on the next append with
//! no separate repair step.
//!
//! Fold order follows timestamp order only, which makes the result
//! independent of how samples were batched: replaying the same samples
//! always yields the same tiers, and compacting an already-compacted series
//! changes nothing.

use super::error::{HistoryError, HistoryResult};
use super::types::{
    DailyBar, HourlyBar, Sample, Series, Tier, DAY_SECS, DETAILED_RETENTION_SECS, HOURLY_RETENTION_SECS,
    HOUR_SECS,
};

/// Start of the hourly bucket covering `timestamp`
pub fn hour_bucket(timestamp: i64) -> i64 {
    timestamp.div_euclid(HOUR_SECS) * HOUR_SECS
}

/// Start of the UTC day covering `timestamp`
pub fn day_bucket(timestamp: i64) -> i64 {
    timestamp.div_euclid(DAY_SECS) * DAY_SECS
}

/// What a compaction pass moved between tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub folded_samples: usize,
    pub folded_hourly: usize,
}

impl CompactionReport {
    pub fn is_noop(&self) -> bool {
        self.folded_samples == 0 && self.folded_hourly == 0
    }
}

/// Fold one detailed sample into its hourly bucket
///
/// Existing bucket: `open` kept, extrema widened, `close` replaced, `count`
/// incremented and `volume` updated as a running mean. A bucket that was
/// backfilled without volume keeps `None` since its mean is unknown.
pub fn fold_sample_into_hourly(hourly: &mut Vec<HourlyBar>, sample: &Sample) {
    let key = hour_bucket(sample.timestamp);

    match hourly.binary_search_by_key(&key, |bar| bar.period_start) {
        Ok(idx) => {
            let bar = &mut hourly[idx];
            let old_count = bar.count as f64;
            bar.high = bar.high.max(sample.price);
            bar.low = bar.low.min(sample.price);
            bar.close = sample.price;
            bar.volume = bar
                .volume
                .map(|old| (old * old_count + sample.volume) / (old_count + 1.0));
            bar.count += 1;
        }
        Err(idx) => hourly.insert(idx, HourlyBar::from_sample(key, sample)),
    }
}

/// Fold one hourly bar into its daily bucket (volume is dropped)
pub fn fold_hourly_into_daily(daily: &mut Vec<DailyBar>, bar: &HourlyBar) {
    let key = day_bucket(bar.period_start);

    match daily.binary_search_by_key(&key, |day| day.period_start) {
        Ok(idx) => {
            let day = &mut daily[idx];
            day.high = day.high.max(bar.high);
            day.low = day.low.min(bar.low);
            day.close = bar.close;
            day.count += bar.count;
        }
        Err(idx) => daily.insert(idx, DailyBar::from_hourly(key, bar)),
    }
}

fn check_sample(instrument: &str, sample: &Sample) -> HistoryResult<()> {
    if sample.price.is_finite() && sample.volume.is_finite() {
        Ok(())
    } else {
        Err(HistoryError::CorruptBucket {
            instrument: instrument.to_string(),
            tier: Tier::Detailed.as_str(),
            period_start: sample.timestamp,
        })
    }
}

fn check_hourly(instrument: &str, bar: &HourlyBar) -> HistoryResult<()> {
    let prices_ok = [bar.open, bar.high, bar.low, bar.close]
        .iter()
        .all(|p| p.is_finite());

    if bar.count > 0 && prices_ok && bar.low <= bar.high {
        Ok(())
    } else {
        Err(HistoryError::CorruptBucket {
            instrument: instrument.to_string(),
            tier: Tier::Hourly.as_str(),
            period_start: bar.period_start,
        })
    }
}

/// Run one compaction pass against `now`
///
/// 1. detailed samples with `timestamp <= now - 7d` fold into hourly bars
/// 2. hourly bars with `period_start <= now - 30d` fold into daily bars
///
/// The pass is all-or-nothing: on a corrupt bucket the series is left
/// exactly as it was and the error is returned.
pub fn compact(series: &mut Series, now: i64) -> HistoryResult<CompactionReport> {
    let detailed_cutoff = now - DETAILED_RETENTION_SECS;
    let hourly_cutoff = now - HOURLY_RETENTION_SECS;

    let detailed_split = series
        .detailed
        .partition_point(|s| s.timestamp <= detailed_cutoff);
    let hourly_expired = series
        .hourly
        .first()
        .map_or(false, |bar| bar.period_start <= hourly_cutoff);

    if detailed_split == 0 && !hourly_expired {
        return Ok(CompactionReport::default());
    }

    // Step 1: detailed → hourly
    let mut hourly = series.hourly.clone();
    for sample in &series.detailed[..detailed_split] {
        check_sample(&series.instrument, sample)?;
        fold_sample_into_hourly(&mut hourly, sample);
    }

    // Step 2: hourly → daily
    let hourly_split = hourly.partition_point(|bar| bar.period_start <= hourly_cutoff);
    let mut daily = series.daily.clone();
    for bar in &hourly[..hourly_split] {
        check_hourly(&series.instrument, bar)?;
        fold_hourly_into_daily(&mut daily, bar);
    }

    // Commit
    series.detailed.drain(..detailed_split);
    series.hourly = hourly.split_off(hourly_split);
    series.daily = daily;

    Ok(CompactionReport {
        folded_samples: detailed_split,
        folded_hourly: hourly_split,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: i64 = 1_700_006_400; // 2023-11-15T00:00:00Z

    fn sample(timestamp: i64, price: f64, volume: f64) -> Sample {
        Sample {
            timestamp,
            price,
            volume,
        }
    }

    fn series_with(samples: Vec<Sample>) -> Series {
        let mut series = Series::new("KRW-BTC".to_string());
        series.detailed = samples;
        series
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(hour_bucket(BASE + 3599), BASE);
        assert_eq!(hour_bucket(BASE + 3600), BASE + 3600);
        assert_eq!(day_bucket(BASE + 86_399), BASE);
        assert_eq!(day_bucket(BASE - 1), BASE - 86_400);
    }

    #[test]
    fn test_fold_mean_volume_and_count() {
        // Six 10-minute samples inside one hour
        let volumes = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let prices = [100.0, 104.0, 98.0, 101.0, 103.0, 102.0];
        let mut hourly = Vec::new();

        for i in 0..6 {
            fold_sample_into_hourly(
                &mut hourly,
                &sample(BASE + i as i64 * 600, prices[i], volumes[i]),
            );
        }

        assert_eq!(hourly.len(), 1);
        let bar = hourly[0];
        assert_eq!(bar.period_start, BASE);
        assert_eq!(bar.count, 6);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 104.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 102.0);
        let volume = bar.volume.unwrap();
        assert!((volume - 35.0).abs() < 1e-9, "mean volume should be 35, got {}", volume);
    }

    #[test]
    fn test_fold_into_backfilled_bar_without_volume() {
        let mut hourly = vec![HourlyBar {
            period_start: BASE,
            open: 50.0,
            high: 55.0,
            low: 45.0,
            close: 52.0,
            count: 1,
            volume: None,
        }];

        fold_sample_into_hourly(&mut hourly, &sample(BASE + 1200, 60.0, 7.0));

        let bar = hourly[0];
        assert_eq!(bar.open, 50.0);
        assert_eq!(bar.high, 60.0);
        assert_eq!(bar.close, 60.0);
        assert_eq!(bar.count, 2);
        assert_eq!(bar.volume, None);
    }

    #[test]
    fn test_compact_moves_only_expired_samples() {
        let now = BASE + 8 * DAY_SECS;
        let mut series = series_with(vec![
            sample(BASE, 100.0, 1.0),            // 8 days old -> hourly
            sample(BASE + 600, 101.0, 3.0),      // 8 days old -> hourly
            sample(now - 3600, 110.0, 1.0),      // recent -> stays
            sample(now, 111.0, 1.0),             // recent -> stays
        ]);

        let report = compact(&mut series, now).unwrap();

        assert_eq!(report.folded_samples, 2);
        assert_eq!(series.detailed.len(), 2);
        assert!(series
            .detailed
            .iter()
            .all(|s| s.timestamp > now - DETAILED_RETENTION_SECS));
        assert_eq!(series.hourly.len(), 1);
        assert_eq!(series.hourly[0].count, 2);
        assert_eq!(series.hourly[0].volume, Some(2.0));
        assert!(series.daily.is_empty());
    }

    #[test]
    fn test_compact_cascades_to_daily_and_drops_volume() {
        let now = BASE + 31 * DAY_SECS;
        let mut series = series_with(vec![
            sample(BASE + 60, 10.0, 1.0),
            sample(BASE + 3660, 12.0, 1.0),
            sample(BASE + 7260, 9.0, 1.0),
        ]);

        let report = compact(&mut series, now).unwrap();

        assert_eq!(report.folded_samples, 3);
        assert_eq!(report.folded_hourly, 3);
        assert!(series.detailed.is_empty());
        assert!(series.hourly.is_empty());
        assert_eq!(series.daily.len(), 1);

        let day = series.daily[0];
        assert_eq!(day.period_start, BASE);
        assert_eq!(day.open, 10.0);
        assert_eq!(day.high, 12.0);
        assert_eq!(day.low, 9.0);
        assert_eq!(day.close, 9.0);
        assert_eq!(day.count, 3);
    }

    #[test]
    fn test_compact_is_idempotent() {
        let now = BASE + 40 * DAY_SECS;
        let samples = (0..500)
            .map(|i| sample(BASE + i * 7_000, 100.0 + (i % 7) as f64, i as f64))
            .collect();
        let mut series = series_with(samples);

        compact(&mut series, now).unwrap();
        let snapshot = series.clone();
        let report = compact(&mut series, now).unwrap();

        assert!(report.is_noop());
        assert_eq!(series, snapshot);
    }

    #[test]
    fn test_compact_independent_of_batching() {
        let samples: Vec<Sample> = (0..300)
            .map(|i| sample(BASE + i * 5_000, 50.0 + (i % 11) as f64, (i % 5) as f64))
            .collect();
        let end = samples.last().unwrap().timestamp;

        // One pass at the end
        let mut batched = series_with(samples.clone());
        compact(&mut batched, end).unwrap();

        // A pass after every sample
        let mut incremental = Series::new("KRW-BTC".to_string());
        for s in &samples {
            incremental.detailed.push(*s);
            compact(&mut incremental, s.timestamp).unwrap();
        }

        assert_eq!(batched, incremental);
    }

    #[test]
    fn test_corrupt_hourly_bucket_leaves_series_untouched() {
        let now = BASE + 31 * DAY_SECS;
        let mut series = series_with(vec![sample(now - 60, 100.0, 1.0)]);
        series.hourly.push(HourlyBar {
            period_start: BASE,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            count: 0,
            volume: None,
        });
        let before = series.clone();

        let result = compact(&mut series, now);

        assert!(matches!(result, Err(HistoryError::CorruptBucket { tier: "hourly", .. })));
        assert_eq!(series, before);
    }
}
