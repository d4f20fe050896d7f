//! Derived indicators, recomputed from the series store on every call
//!
//! Nothing here is cached or persisted, and nothing performs I/O.

pub mod rsi;
pub mod trend;

pub use rsi::{rsi, rsi_from_closes, rsi_snapshot, RsiSnapshot, DEFAULT_RSI_PERIOD};
pub use trend::{
    latest_volume, multi_period_trends, price_trend, MultiPeriodTrends, PriceTrend,
    TrendDirection,
};
