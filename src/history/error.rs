//! Error taxonomy for the series store and its repositories

use thiserror::Error;

/// Errors raised by the series store, compaction, and persistence
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Out-of-order or malformed sample; caller logs and drops it
    #[error("invalid sample for {instrument} at {timestamp}: {reason}")]
    InvalidSample {
        instrument: String,
        timestamp: i64,
        reason: String,
    },

    /// External source returned nothing to seed the series with
    #[error("no historical data available for {instrument}")]
    BackfillUnavailable { instrument: String },

    /// A bucket failed validation during compaction
    #[error("corrupt {tier} bucket at {period_start} for {instrument}")]
    CorruptBucket {
        instrument: String,
        tier: &'static str,
        period_start: i64,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;
