//! Tiered price history with on-demand indicators and rule-based instrument selection
//!
//! - `history` - per-instrument series store with cascading compaction
//! - `indicators` - RSI and trend summaries derived from the store
//! - `selection` - pure selection engine over a market snapshot
//! - `collector` - market data collection, backfill and the daily selection run
//! - `config` - runtime configuration from environment variables

pub mod collector;
pub mod config;
pub mod history;
pub mod indicators;
pub mod selection;
