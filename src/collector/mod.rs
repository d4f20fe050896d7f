//! Runtime collaborators around the series store
//!
//! - `source` - market data / holdings interfaces
//! - `upbit` - REST adapter for the Upbit exchange
//! - `tracking` - the shared tracked-instrument set
//! - `ingestion` - collection cycles and historical backfill
//! - `scheduler` - daily selection run

pub mod ingestion;
pub mod scheduler;
pub mod source;
pub mod tracking;
pub mod upbit;

pub use ingestion::{
    backfill_instrument, collect_until_stored, collector_task, run_collection_cycle, CycleReport,
    BACKFILL_DAILY_BARS, BACKFILL_HOURLY_BARS,
};
pub use scheduler::{next_selection_run, run_selection, selection_task, SelectionRun};
pub use source::{
    CurrentStats, Granularity, HoldingsProvider, MarketDataSource, OhlcBar, SourceError,
    StaticHoldings,
};
pub use tracking::{TrackedSet, TrackingDiff};
pub use upbit::UpbitSource;
