//! Sample collection and historical backfill
//!
//! The collector is the only writer of detailed samples. Each cycle:
//! 1. Checks the store pause flag (deferred cycles retry shortly after)
//! 2. Fetches current stats for the tracked set in one request
//! 3. Appends one sample per instrument stamped with the cycle time
//!
//! Rejected samples are logged and dropped; they never abort the cycle.

use super::source::{Granularity, MarketDataSource};
use super::tracking::TrackedSet;
use crate::history::{AppendOutcome, CompactionReport, HistoryError, SeriesStore};
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Daily candles requested when a new instrument starts being tracked
pub const BACKFILL_DAILY_BARS: usize = 20;

/// Hourly candles requested when a new instrument starts being tracked
pub const BACKFILL_HOURLY_BARS: usize = 72;

/// Outcome of one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Store was paused; nothing was fetched or written
    pub deferred: bool,
    pub appended: usize,
    /// Samples refused by the store (out of order, malformed)
    pub rejected: usize,
    /// Tracked instruments absent from the source response
    pub missing: usize,
    /// Appends that failed to persist, or a failed fetch
    pub failed: usize,
}

impl CycleReport {
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Default::default()
        }
    }
}

/// Run one collection cycle at time `now`
pub async fn run_collection_cycle(
    store: &SeriesStore,
    source: &dyn MarketDataSource,
    tracked: &TrackedSet,
    now: i64,
) -> CycleReport {
    if store.is_paused() {
        return CycleReport::deferred();
    }

    let instruments = tracked.instruments();
    if instruments.is_empty() {
        return CycleReport::default();
    }

    let stats = match source.get_current_stats(&instruments).await {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("⚠️  Failed to fetch current stats: {}", e);
            return CycleReport {
                failed: 1,
                ..Default::default()
            };
        }
    };

    let mut report = CycleReport::default();

    for instrument in &instruments {
        let Some(observation) = stats.iter().find(|s| &s.instrument == instrument) else {
            log::debug!("No current stats for {}", instrument);
            report.missing += 1;
            continue;
        };

        match store.append_sample(instrument, now, observation.price, observation.volume_24h) {
            Ok(AppendOutcome::Stored { .. }) => report.appended += 1,
            Ok(AppendOutcome::Deferred) => {
                // Paused mid-cycle: the cycle is retried at the same `now`, so
                // instruments already appended are replaced rather than doubled
                log::debug!("⏸️  Pause raised mid-cycle at {}", instrument);
                report.deferred = true;
                break;
            }
            Err(HistoryError::InvalidSample { reason, .. }) => {
                log::warn!("⚠️  Dropped sample for {}: {}", instrument, reason);
                report.rejected += 1;
            }
            Err(e) => {
                log::error!("❌ Failed to store sample for {}: {}", instrument, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Run a cycle at `now`, retrying every `retry` while the store is paused
///
/// Retries keep the original cycle time.
pub async fn collect_until_stored(
    store: &SeriesStore,
    source: &dyn MarketDataSource,
    tracked: &TrackedSet,
    now: i64,
    retry: Duration,
) -> CycleReport {
    loop {
        let report = run_collection_cycle(store, source, tracked, now).await;
        if !report.deferred {
            return report;
        }
        log::debug!("⏸️  Store paused, retrying collection in {}ms", retry.as_millis());
        sleep(retry).await;
    }
}

/// Collector loop: one cycle every `interval_secs`
///
/// A cycle deferred by the pause flag is retried every `pause_retry_ms`
/// until the store resumes. Runs until cancelled.
pub async fn collector_task(
    store: Arc<SeriesStore>,
    source: Arc<dyn MarketDataSource>,
    tracked: Arc<TrackedSet>,
    interval_secs: u64,
    pause_retry_ms: u64,
) {
    log::info!(
        "⏰ Starting collector (interval: {}s, pause retry: {}ms)",
        interval_secs,
        pause_retry_ms
    );

    let mut timer = interval(Duration::from_secs(interval_secs));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let report = collect_until_stored(
            &store,
            source.as_ref(),
            &tracked,
            chrono::Utc::now().timestamp(),
            Duration::from_millis(pause_retry_ms),
        )
        .await;

        log::info!(
            "📊 Collected {} samples ({} rejected, {} missing, {} failed) for {} tracked",
            report.appended,
            report.rejected,
            report.missing,
            report.failed,
            tracked.len()
        );
    }
}

/// Seed a newly tracked instrument with daily and hourly history
///
/// An unreachable or empty source is not fatal: the instrument simply
/// starts with empty coarse tiers. Returns the compaction report when
/// anything was seeded.
pub async fn backfill_instrument(
    store: &SeriesStore,
    source: &dyn MarketDataSource,
    instrument: &str,
) -> Option<CompactionReport> {
    log::info!("📥 Backfilling {}", instrument);

    let daily = match source
        .get_historical_ohlc(instrument, Granularity::Daily, BACKFILL_DAILY_BARS)
        .await
    {
        Ok(bars) => bars.iter().map(|b| b.to_daily()).collect(),
        Err(e) => {
            log::warn!("⚠️  Daily history unavailable for {}: {}", instrument, e);
            Vec::new()
        }
    };

    let hourly = match source
        .get_historical_ohlc(instrument, Granularity::Hourly, BACKFILL_HOURLY_BARS)
        .await
    {
        Ok(bars) => bars.iter().map(|b| b.to_hourly()).collect(),
        Err(e) => {
            log::warn!("⚠️  Hourly history unavailable for {}: {}", instrument, e);
            Vec::new()
        }
    };

    match store.load_historical(instrument, daily, hourly) {
        Ok(report) => Some(report),
        Err(HistoryError::BackfillUnavailable { .. }) => {
            log::warn!("⚠️  No history for {}, starting empty", instrument);
            None
        }
        Err(e) => {
            log::error!("❌ Backfill failed for {}: {}", instrument, e);
            None
        }
    }
}
