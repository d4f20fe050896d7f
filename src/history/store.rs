//! Series store: the single source of truth for per-instrument history
//!
//! ## Concurrency
//!
//! Each instrument owns a `SeriesCell`:
//! - `writer` serialises appends/backfills for that instrument only
//! - `snapshot` holds the published `Arc<Series>`; readers clone the `Arc`
//!   under a short read lock and never block a writer for longer than that
//!
//! A writer works on a private copy, runs compaction, and swaps the new
//! snapshot in with one pointer store. Readers therefore observe either the
//! state before an append or the state after append + compaction.
//!
//! The store-wide pause flag is cooperative: appends issued while paused
//! return `AppendOutcome::Deferred` and leave state untouched.

use super::compaction::{compact, day_bucket, hour_bucket, CompactionReport};
use super::error::{HistoryError, HistoryResult};
use super::repository::SeriesRepository;
use super::types::{DailyBar, HourlyBar, Sample, Series, Tier, TierEntries};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Result of `append_sample`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Sample stored and published. `report` is `None` when compaction hit a
    /// corrupt bucket and the sample was published uncompacted.
    Stored { report: Option<CompactionReport> },

    /// Store is paused; nothing was written and the caller should retry
    Deferred,
}

struct SeriesCell {
    writer: Mutex<()>,
    snapshot: RwLock<Arc<Series>>,
}

impl SeriesCell {
    fn new(series: Series) -> Self {
        Self {
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(series)),
        }
    }

    fn current(&self) -> Arc<Series> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, series: Series) -> Arc<Series> {
        let published = Arc::new(series);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = published.clone();
        published
    }
}

pub struct SeriesStore {
    cells: RwLock<HashMap<String, Arc<SeriesCell>>>,
    repository: Arc<dyn SeriesRepository>,
    paused: AtomicBool,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl SeriesStore {
    /// Create a store backed by `repository`, using wall-clock time
    pub fn new(repository: Arc<dyn SeriesRepository>) -> Self {
        Self::new_with_timestamp_fn(
            repository,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    /// Create a store with a custom clock
    ///
    /// The clock is only consulted by `load_historical`; appends compact
    /// against the sample's own timestamp.
    pub fn new_with_timestamp_fn(
        repository: Arc<dyn SeriesRepository>,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        log::info!(
            "📈 Series store initialised ({} repository)",
            repository.backend_type()
        );

        Self {
            cells: RwLock::new(HashMap::new()),
            repository,
            paused: AtomicBool::new(false),
            now_fn,
        }
    }

    fn resident(&self, instrument: &str) -> Option<Arc<SeriesCell>> {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instrument)
            .cloned()
    }

    /// Resident cell for `instrument`, loading or creating the series on first touch
    fn cell(&self, instrument: &str) -> HistoryResult<Arc<SeriesCell>> {
        if let Some(cell) = self.resident(instrument) {
            return Ok(cell);
        }

        let series = match self.repository.load(instrument)? {
            Some(series) => {
                log::debug!(
                    "Hydrated {} ({} detailed, {} hourly, {} daily)",
                    instrument,
                    series.detailed.len(),
                    series.hourly.len(),
                    series.daily.len()
                );
                series
            }
            None => {
                log::debug!("New series for {}", instrument);
                Series::new(instrument.to_string())
            }
        };

        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cells
            .entry(instrument.to_string())
            .or_insert_with(|| Arc::new(SeriesCell::new(series)))
            .clone())
    }

    /// Append one collector observation and re-drive compaction
    ///
    /// Samples must arrive in non-decreasing timestamp order per instrument.
    /// A sample stamped exactly at the watermark replaces the latest one.
    pub fn append_sample(
        &self,
        instrument: &str,
        timestamp: i64,
        price: f64,
        volume: f64,
    ) -> HistoryResult<AppendOutcome> {
        if self.is_paused() {
            log::debug!("⏸️  Store paused, deferring sample for {}", instrument);
            return Ok(AppendOutcome::Deferred);
        }

        let invalid = |reason: String| HistoryError::InvalidSample {
            instrument: instrument.to_string(),
            timestamp,
            reason,
        };

        if !price.is_finite() || price <= 0.0 {
            return Err(invalid(format!("price must be positive and finite, got {}", price)));
        }
        if !volume.is_finite() {
            return Err(invalid(format!("volume must be finite, got {}", volume)));
        }

        let cell = self.cell(instrument)?;
        let _writer = cell.writer.lock().unwrap_or_else(PoisonError::into_inner);

        // Pause may have been raised while we waited for the writer
        if self.is_paused() {
            log::debug!("⏸️  Store paused, deferring sample for {}", instrument);
            return Ok(AppendOutcome::Deferred);
        }

        let mut series = Series::clone(&cell.current());

        if let Some(watermark) = series.watermark {
            if timestamp < watermark {
                return Err(invalid(format!(
                    "older than newest accepted sample at {}",
                    watermark
                )));
            }
        }

        let sample = Sample {
            timestamp,
            price,
            volume,
        };
        match series.detailed.last_mut() {
            Some(last) if last.timestamp == timestamp => *last = sample,
            _ => series.detailed.push(sample),
        }
        series.watermark = Some(timestamp);

        let report = match compact(&mut series, timestamp) {
            Ok(report) => {
                if !report.is_noop() {
                    log::debug!(
                        "🗜️  {} compacted: {} samples → hourly, {} hourly → daily",
                        instrument,
                        report.folded_samples,
                        report.folded_hourly
                    );
                }
                Some(report)
            }
            Err(e) => {
                log::warn!("⚠️  Compaction skipped for {}: {}", instrument, e);
                None
            }
        };

        let published = cell.publish(series);
        self.repository.save(&published)?;

        Ok(AppendOutcome::Stored { report })
    }

    /// Seed the hourly and daily tiers from an external source
    ///
    /// Bars are aligned to their bucket start. Buckets already present are
    /// kept; incoming duplicates and malformed bars are skipped. Hourly bars
    /// from the first detailed sample's hour onwards are skipped too, since
    /// those hours still fold from the detailed tier. The detailed tier is
    /// never touched. A compaction pass against the store clock runs
    /// afterwards so retention holds for the seeded bars too.
    pub fn load_historical(
        &self,
        instrument: &str,
        daily_bars: Vec<DailyBar>,
        hourly_bars: Vec<HourlyBar>,
    ) -> HistoryResult<CompactionReport> {
        if daily_bars.is_empty() && hourly_bars.is_empty() {
            return Err(HistoryError::BackfillUnavailable {
                instrument: instrument.to_string(),
            });
        }

        let cell = self.cell(instrument)?;
        let _writer = cell.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut series = Series::clone(&cell.current());

        let mut inserted = 0usize;
        let mut skipped = 0usize;

        for mut bar in daily_bars {
            bar.period_start = day_bucket(bar.period_start);
            if !bar_is_valid(bar.open, bar.high, bar.low, bar.close) {
                skipped += 1;
                continue;
            }
            match series
                .daily
                .binary_search_by_key(&bar.period_start, |d| d.period_start)
            {
                Ok(_) => skipped += 1,
                Err(idx) => {
                    series.daily.insert(idx, bar);
                    inserted += 1;
                }
            }
        }

        let detailed_from = series.detailed.first().map(|s| hour_bucket(s.timestamp));

        for mut bar in hourly_bars {
            bar.period_start = hour_bucket(bar.period_start);
            if detailed_from.map_or(false, |from| bar.period_start >= from) {
                skipped += 1;
                continue;
            }
            let volume_ok = bar.volume.map_or(true, f64::is_finite);
            if !bar_is_valid(bar.open, bar.high, bar.low, bar.close) || !volume_ok {
                skipped += 1;
                continue;
            }
            match series
                .hourly
                .binary_search_by_key(&bar.period_start, |h| h.period_start)
            {
                Ok(_) => skipped += 1,
                Err(idx) => {
                    series.hourly.insert(idx, bar);
                    inserted += 1;
                }
            }
        }

        let now = (self.now_fn)();
        let report = compact(&mut series, now)?;

        log::info!(
            "📥 Backfilled {}: {} bars inserted, {} skipped",
            instrument,
            inserted,
            skipped
        );

        let published = cell.publish(series);
        self.repository.save(&published)?;

        Ok(report)
    }

    /// Most recent `limit` entries of `tier`, ascending by time
    ///
    /// Only resident series are consulted; an unknown instrument yields an
    /// empty result.
    pub fn read(&self, instrument: &str, tier: Tier, limit: usize) -> TierEntries {
        match self.snapshot(instrument) {
            Some(series) => series.tail(tier, limit),
            None => Series::default().tail(tier, limit),
        }
    }

    /// Published snapshot of a resident series
    pub fn snapshot(&self, instrument: &str) -> Option<Arc<Series>> {
        self.resident(instrument).map(|cell| cell.current())
    }

    /// Load a persisted series into memory ahead of reads
    pub fn hydrate(&self, instrument: &str) -> HistoryResult<()> {
        self.cell(instrument).map(|_| ())
    }

    /// Instruments currently resident, sorted
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        log::info!("⏸️  Series store paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        log::info!("▶️  Series store resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

fn bar_is_valid(open: f64, high: f64, low: f64, close: f64) -> bool {
    [open, high, low, close].iter().all(|p| p.is_finite()) && low <= high
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::repository::InMemorySeriesRepository;
    use crate::history::types::{DAY_SECS, HOUR_SECS};

    const BASE: i64 = 1_700_006_400; // 2023-11-15T00:00:00Z

    fn test_store(now: i64) -> (Arc<InMemorySeriesRepository>, SeriesStore) {
        let repo = Arc::new(InMemorySeriesRepository::new());
        let store = SeriesStore::new_with_timestamp_fn(repo.clone(), Box::new(move || now));
        (repo, store)
    }

    fn hourly(period_start: i64, close: f64) -> HourlyBar {
        HourlyBar {
            period_start,
            open: close,
            high: close,
            low: close,
            close,
            count: 1,
            volume: None,
        }
    }

    fn daily(period_start: i64, close: f64) -> DailyBar {
        DailyBar {
            period_start,
            open: close,
            high: close,
            low: close,
            close,
            count: 1,
        }
    }

    #[test]
    fn test_append_and_read() {
        let (repo, store) = test_store(BASE);

        for i in 0..5 {
            let outcome = store
                .append_sample("KRW-BTC", BASE + i * 600, 100.0 + i as f64, 10.0)
                .unwrap();
            assert!(matches!(outcome, AppendOutcome::Stored { report: Some(_) }));
        }

        let entries = store.read("KRW-BTC", Tier::Detailed, 10);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries.closes().last(), Some(&104.0));
        assert_eq!(repo.load("KRW-BTC").unwrap().unwrap().detailed.len(), 5);
    }

    #[test]
    fn test_rejects_out_of_order_sample() {
        let (_repo, store) = test_store(BASE);
        store.append_sample("KRW-BTC", BASE + 600, 100.0, 1.0).unwrap();

        let result = store.append_sample("KRW-BTC", BASE, 99.0, 1.0);

        assert!(matches!(result, Err(HistoryError::InvalidSample { .. })));
        assert_eq!(store.read("KRW-BTC", Tier::Detailed, 10).len(), 1);
    }

    #[test]
    fn test_rejects_non_positive_and_non_finite() {
        let (_repo, store) = test_store(BASE);

        assert!(store.append_sample("KRW-BTC", BASE, 0.0, 1.0).is_err());
        assert!(store.append_sample("KRW-BTC", BASE, f64::NAN, 1.0).is_err());
        assert!(store.append_sample("KRW-BTC", BASE, 1.0, f64::INFINITY).is_err());
        assert!(store.read("KRW-BTC", Tier::Detailed, 10).is_empty());
    }

    #[test]
    fn test_equal_timestamp_replaces_latest() {
        let (_repo, store) = test_store(BASE);
        store.append_sample("KRW-BTC", BASE, 100.0, 1.0).unwrap();
        store.append_sample("KRW-BTC", BASE, 101.0, 2.0).unwrap();

        let entries = store.read("KRW-BTC", Tier::Detailed, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.closes(), vec![101.0]);
    }

    #[test]
    fn test_ordering_survives_full_compaction() {
        let (_repo, store) = test_store(BASE);
        store.append_sample("KRW-BTC", BASE + 40 * DAY_SECS, 100.0, 1.0).unwrap();

        // Far older than anything left in the detailed tier
        let result = store.append_sample("KRW-BTC", BASE, 100.0, 1.0);
        assert!(matches!(result, Err(HistoryError::InvalidSample { .. })));
    }

    #[test]
    fn test_append_compacts_against_sample_time() {
        let (_repo, store) = test_store(BASE);
        store.append_sample("KRW-BTC", BASE, 100.0, 4.0).unwrap();
        store.append_sample("KRW-BTC", BASE + 600, 102.0, 6.0).unwrap();

        let outcome = store
            .append_sample("KRW-BTC", BASE + 8 * DAY_SECS, 110.0, 1.0)
            .unwrap();

        match outcome {
            AppendOutcome::Stored { report: Some(report) } => {
                assert_eq!(report.folded_samples, 2)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let hourly = store.read("KRW-BTC", Tier::Hourly, 10);
        assert_eq!(hourly.timestamps(), vec![BASE]);
        assert_eq!(store.read("KRW-BTC", Tier::Detailed, 10).len(), 1);
    }

    #[test]
    fn test_paused_store_defers() {
        let (_repo, store) = test_store(BASE);
        store.pause();

        let outcome = store.append_sample("KRW-BTC", BASE, 100.0, 1.0).unwrap();
        assert_eq!(outcome, AppendOutcome::Deferred);
        assert!(store.read("KRW-BTC", Tier::Detailed, 10).is_empty());

        store.resume();
        let outcome = store.append_sample("KRW-BTC", BASE, 100.0, 1.0).unwrap();
        assert!(matches!(outcome, AppendOutcome::Stored { .. }));
    }

    #[test]
    fn test_corrupt_bucket_still_publishes_sample() {
        let repo = Arc::new(InMemorySeriesRepository::new());
        let mut seeded = Series::new("KRW-BTC".to_string());
        seeded.hourly.push(HourlyBar {
            count: 0,
            ..hourly(BASE, 10.0)
        });
        repo.save(&seeded).unwrap();
        let store = SeriesStore::new_with_timestamp_fn(repo.clone(), Box::new(|| BASE));

        let outcome = store
            .append_sample("KRW-BTC", BASE + 31 * DAY_SECS, 100.0, 1.0)
            .unwrap();

        assert_eq!(outcome, AppendOutcome::Stored { report: None });
        assert_eq!(store.read("KRW-BTC", Tier::Detailed, 10).len(), 1);
        assert_eq!(store.read("KRW-BTC", Tier::Hourly, 10).len(), 1);
    }

    #[test]
    fn test_load_historical_skips_duplicates() {
        let now = BASE + 2 * DAY_SECS;
        let (_repo, store) = test_store(now);

        store
            .load_historical(
                "KRW-ETH",
                vec![daily(BASE, 1.0), daily(BASE + DAY_SECS, 2.0)],
                vec![hourly(now - HOUR_SECS, 3.0)],
            )
            .unwrap();
        store
            .load_historical(
                "KRW-ETH",
                vec![daily(BASE + DAY_SECS, 99.0)],
                vec![hourly(now - HOUR_SECS + 60, 99.0), hourly(now - 2 * HOUR_SECS, 4.0)],
            )
            .unwrap();

        let days = store.read("KRW-ETH", Tier::Daily, 10);
        assert_eq!(days.closes(), vec![1.0, 2.0]);
        let hours = store.read("KRW-ETH", Tier::Hourly, 10);
        assert_eq!(hours.closes(), vec![4.0, 3.0]);
        assert!(store.read("KRW-ETH", Tier::Detailed, 10).is_empty());
    }

    #[test]
    fn test_load_historical_leaves_detailed_hours_alone() {
        let now = BASE + 2 * DAY_SECS;
        let (_repo, store) = test_store(now);

        // Tracked earlier: two days of 10-minute samples still in the detailed tier
        for i in 0..288 {
            store
                .append_sample("KRW-BTC", BASE + i * 600, 50.0 + i as f64, 2.0)
                .unwrap();
        }

        // Re-tracked: 72 hourly bars ending now
        let bars: Vec<HourlyBar> = (0..72)
            .map(|i| hourly(now - (72 - i) * HOUR_SECS, 10.0))
            .collect();
        store.load_historical("KRW-BTC", vec![], bars).unwrap();

        let series = store.snapshot("KRW-BTC").unwrap();
        assert_eq!(series.detailed.len(), 288);
        assert_eq!(series.hourly.len(), 24);
        let first_detailed = series.detailed[0].timestamp;
        assert!(series.hourly.iter().all(|b| b.period_start < hour_bucket(first_detailed)));

        // A week later the old samples fold into fresh buckets of their own
        store
            .append_sample("KRW-BTC", BASE + 8 * DAY_SECS, 60.0, 1.0)
            .unwrap();
        let series = store.snapshot("KRW-BTC").unwrap();
        let folded = series
            .hourly
            .iter()
            .find(|b| b.period_start == BASE)
            .unwrap();
        assert_eq!(folded.count, 6);
        assert_eq!(folded.open, 50.0);
        assert_eq!(folded.volume, Some(2.0));
    }

    #[test]
    fn test_load_historical_compacts_stale_hourly() {
        let now = BASE + 40 * DAY_SECS;
        let (_repo, store) = test_store(now);

        let report = store
            .load_historical("KRW-ETH", vec![], vec![hourly(BASE, 5.0), hourly(now - HOUR_SECS, 6.0)])
            .unwrap();

        assert_eq!(report.folded_hourly, 1);
        assert_eq!(store.read("KRW-ETH", Tier::Daily, 10).closes(), vec![5.0]);
        assert_eq!(store.read("KRW-ETH", Tier::Hourly, 10).closes(), vec![6.0]);
    }

    #[test]
    fn test_load_historical_empty_inputs() {
        let (_repo, store) = test_store(BASE);

        let result = store.load_historical("KRW-ETH", vec![], vec![]);

        assert!(matches!(result, Err(HistoryError::BackfillUnavailable { .. })));
    }

    #[test]
    fn test_read_unknown_instrument() {
        let (_repo, store) = test_store(BASE);
        assert!(store.read("KRW-NOPE", Tier::Hourly, 5).is_empty());
        assert!(store.instruments().is_empty());
    }

    #[test]
    fn test_hydrate_loads_persisted_series() {
        let repo = Arc::new(InMemorySeriesRepository::new());
        let mut persisted = Series::new("KRW-XRP".to_string());
        persisted.daily.push(daily(BASE, 900.0));
        repo.save(&persisted).unwrap();

        let store = SeriesStore::new(repo);
        assert!(store.read("KRW-XRP", Tier::Daily, 5).is_empty());

        store.hydrate("KRW-XRP").unwrap();

        assert_eq!(store.read("KRW-XRP", Tier::Daily, 5).closes(), vec![900.0]);
        assert_eq!(store.instruments(), vec!["KRW-XRP".to_string()]);
    }

    #[test]
    fn test_concurrent_appends_on_distinct_instruments() {
        let (_repo, store) = test_store(BASE);
        let store = Arc::new(store);

        let handles: Vec<_> = ["KRW-BTC", "KRW-ETH", "KRW-SOL", "KRW-ADA"]
            .into_iter()
            .map(|instrument| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .append_sample(instrument, BASE + i * 600, 10.0 + i as f64, 1.0)
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.instruments().len(), 4);
        for instrument in store.instruments() {
            assert_eq!(store.read(&instrument, Tier::Detailed, 100).len(), 50);
        }
    }
}
