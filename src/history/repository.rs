//! Series repository trait
//!
//! The store is agnostic to where series live. Any backend works as long as
//! `load` reflects the latest completed `save`.
//!
//! Implementations:
//! - `InMemorySeriesRepository` - tests and ephemeral runs
//! - `JsonFileRepository` - one JSON document per instrument
//! - `SqliteSeriesRepository` - tier tables in a shared SQLite database

use super::error::{HistoryError, HistoryResult};
use super::types::Series;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable storage for one `Series` per instrument
pub trait SeriesRepository: Send + Sync {
    /// Load the stored series, `Ok(None)` if the instrument was never saved
    fn load(&self, instrument: &str) -> HistoryResult<Option<Series>>;

    /// Replace the stored series for `series.instrument`
    fn save(&self, series: &Series) -> HistoryResult<()>;

    /// Backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Repository that keeps series in process memory
#[derive(Debug, Default)]
pub struct InMemorySeriesRepository {
    series: Mutex<HashMap<String, Series>>,
}

impl InMemorySeriesRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instruments saved so far
    pub fn len(&self) -> usize {
        self.series.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SeriesRepository for InMemorySeriesRepository {
    fn load(&self, instrument: &str) -> HistoryResult<Option<Series>> {
        let guard = self
            .series
            .lock()
            .map_err(|_| HistoryError::Persistence("repository lock poisoned".into()))?;
        Ok(guard.get(instrument).cloned())
    }

    fn save(&self, series: &Series) -> HistoryResult<()> {
        let mut guard = self
            .series
            .lock()
            .map_err(|_| HistoryError::Persistence("repository lock poisoned".into()))?;
        guard.insert(series.instrument.clone(), series.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
