//! Tiered price history
//!
//! Per-instrument series in three resolutions, compacted as they age:
//!
//! ```text
//! append_sample ──► detailed (7d) ──► hourly (30d) ──► daily (∞)
//!                                 ▲
//! load_historical ────────────────┘ (hourly + daily seeding)
//! ```
//!
//! `SeriesStore` owns the in-memory snapshots and writes through to a
//! `SeriesRepository` after every change.

pub mod compaction;
pub mod error;
pub mod json_repository;
pub mod repository;
pub mod sqlite_repository;
pub mod store;
pub mod types;

pub use compaction::{compact, CompactionReport};
pub use error::{HistoryError, HistoryResult};
pub use json_repository::JsonFileRepository;
pub use repository::{InMemorySeriesRepository, SeriesRepository};
pub use sqlite_repository::{run_schema_migrations, SqliteSeriesRepository};
pub use store::{AppendOutcome, SeriesStore};
pub use types::{
    DailyBar, HourlyBar, Sample, Series, Tier, TierEntries, DAY_SECS, DETAILED_RETENTION_SECS,
    HOURLY_RETENTION_SECS, HOUR_SECS,
};
