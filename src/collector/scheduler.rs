//! Daily selection scheduler
//!
//! A selection run reasons over a cross-instrument snapshot, so ingestion is
//! paused store-wide for its duration:
//!
//! ```text
//! pause → candidate snapshot + holdings → select → resume
//!       → replace tracked set → backfill added instruments
//! ```
//!
//! The store is resumed on every exit path, including a failed snapshot.

use super::ingestion::backfill_instrument;
use super::source::{HoldingsProvider, MarketDataSource, SourceError};
use super::tracking::{TrackedSet, TrackingDiff};
use crate::history::SeriesStore;
use crate::selection::{select, SelectionOutcome};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Gap between backfills of consecutive added instruments
pub const BACKFILL_GAP_MS: u64 = 1_000;

/// Result of one selection run
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRun {
    pub outcome: SelectionOutcome,
    pub diff: TrackingDiff,
    /// Added instruments that received any history
    pub backfilled: usize,
}

/// Keeps the store paused for as long as it lives
struct PauseGuard<'a> {
    store: &'a SeriesStore,
}

impl<'a> PauseGuard<'a> {
    fn new(store: &'a SeriesStore) -> Self {
        store.pause();
        Self { store }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.store.resume();
    }
}

/// Run one selection and apply it to the tracked set
///
/// On a failed candidate snapshot the tracked set is left unchanged.
/// Holdings failures are logged and treated as holding nothing.
pub async fn run_selection(
    store: &SeriesStore,
    source: &dyn MarketDataSource,
    holdings: &dyn HoldingsProvider,
    pinned: &BTreeSet<String>,
    tracked: &TrackedSet,
    backfill_gap: Duration,
) -> Result<SelectionRun, SourceError> {
    log::info!("🪙 Selection run starting ({} pinned)", pinned.len());

    let outcome = {
        let _pause = PauseGuard::new(store);

        let candidates = source.get_candidate_snapshot().await?;
        let held = match holdings.held_instruments().await {
            Ok(held) => held,
            Err(e) => {
                log::warn!("⚠️  Failed to load holdings, assuming none: {}", e);
                BTreeSet::new()
            }
        };

        select(&candidates, &held, pinned)
    };

    let diff = tracked.replace(outcome.selected.clone());
    if diff.is_empty() {
        log::info!("📌 Tracked set unchanged ({} instruments)", outcome.selected.len());
    } else {
        log::info!(
            "📌 Tracked set updated: +[{}] -[{}]",
            diff.added.iter().cloned().collect::<Vec<_>>().join(", "),
            diff.removed.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    let mut backfilled = 0;
    for (i, instrument) in diff.added.iter().enumerate() {
        if i > 0 {
            sleep(backfill_gap).await;
        }
        if backfill_instrument(store, source, instrument).await.is_some() {
            backfilled += 1;
        }
    }

    Ok(SelectionRun {
        outcome,
        diff,
        backfilled,
    })
}

/// Next occurrence of `hour_utc`:00 strictly after `now`
pub fn next_selection_run(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour_utc % 24, 0, 0).unwrap_or_default();
    let today = now.date_naive().and_time(time).and_utc();

    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Selection loop: one run per day at `hour_utc`. Runs until cancelled.
pub async fn selection_task(
    store: Arc<SeriesStore>,
    source: Arc<dyn MarketDataSource>,
    holdings: Arc<dyn HoldingsProvider>,
    pinned: BTreeSet<String>,
    tracked: Arc<TrackedSet>,
    hour_utc: u32,
) {
    log::info!("⏰ Starting selection scheduler (daily at {:02}:00 UTC)", hour_utc);

    loop {
        let now = Utc::now();
        let next = next_selection_run(now, hour_utc);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        log::info!("⏳ Next selection run at {}", next.format("%Y-%m-%d %H:%M UTC"));
        sleep(wait).await;

        match run_selection(
            &store,
            source.as_ref(),
            holdings.as_ref(),
            &pinned,
            &tracked,
            Duration::from_millis(BACKFILL_GAP_MS),
        )
        .await
        {
            Ok(run) => log::info!(
                "✅ Selection run complete: {} tracked, {} backfilled",
                run.outcome.selected.len(),
                run.backfilled
            ),
            Err(e) => log::error!("❌ Selection run failed, tracked set kept: {}", e),
        }
    }
}
