//! Collaborator interfaces for market data and holdings

use crate::history::{DailyBar, HourlyBar};
use crate::selection::CandidateStats;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("decode error: {0}")]
    Decode(String),
}

/// Latest observation for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStats {
    pub instrument: String,
    pub price: f64,
    /// Trailing 24h traded volume
    pub volume_24h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hourly,
    Daily,
}

/// OHLC candle as reported by a source, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub period_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl OhlcBar {
    /// Backfilled hourly bars count as a single observation
    pub fn to_hourly(&self) -> HourlyBar {
        HourlyBar {
            period_start: self.period_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            count: 1,
            volume: self.volume,
        }
    }

    pub fn to_daily(&self) -> DailyBar {
        DailyBar {
            period_start: self.period_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            count: 1,
        }
    }
}

/// External market data
///
/// Partial or empty responses mean "no data" for the instruments missing
/// from them; only transport-level failures are errors.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_current_stats(&self, instruments: &[String])
        -> Result<Vec<CurrentStats>, SourceError>;

    async fn get_historical_ohlc(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> Result<Vec<OhlcBar>, SourceError>;

    /// 24h stats for every instrument eligible for selection
    async fn get_candidate_snapshot(&self) -> Result<BTreeMap<String, CandidateStats>, SourceError>;
}

/// Instruments currently held by the account
#[async_trait]
pub trait HoldingsProvider: Send + Sync {
    async fn held_instruments(&self) -> Result<BTreeSet<String>, SourceError>;
}

/// Fixed holdings (configuration or tests)
#[derive(Debug, Clone, Default)]
pub struct StaticHoldings {
    held: BTreeSet<String>,
}

impl StaticHoldings {
    pub fn new(held: impl IntoIterator<Item = String>) -> Self {
        Self {
            held: held.into_iter().collect(),
        }
    }
}

#[async_trait]
impl HoldingsProvider for StaticHoldings {
    async fn held_instruments(&self) -> Result<BTreeSet<String>, SourceError> {
        Ok(self.held.clone())
    }
}
