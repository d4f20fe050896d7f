//! History Runtime
//!
//! This binary wires the tiered store to live market data:
//! - Opens the configured series repository (SQLite schema applied on start)
//! - Hydrates and backfills the initial tracked set (pinned + held)
//! - Spawns the collector loop and the daily selection scheduler
//!
//! Usage:
//!   cargo run --release --bin history_runtime
//!
//! Environment variables: see `tickflow::config::RuntimeConfig::from_env`.

use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use tickflow::collector::{
    backfill_instrument, collector_task, selection_task, HoldingsProvider, MarketDataSource,
    StaticHoldings, TrackedSet, UpbitSource,
};
use tickflow::config::{RuntimeConfig, StorageBackend};
use tickflow::history::{
    InMemorySeriesRepository, JsonFileRepository, SeriesRepository, SeriesStore,
    SqliteSeriesRepository,
};
use tickflow::indicators::{multi_period_trends, rsi_snapshot};

fn open_repository(
    config: &RuntimeConfig,
) -> Result<Arc<dyn SeriesRepository>, Box<dyn std::error::Error>> {
    let repository: Arc<dyn SeriesRepository> = match config.storage {
        StorageBackend::Sqlite => Arc::new(SqliteSeriesRepository::open(
            &config.db_path,
            &config.schema_dir,
        )?),
        StorageBackend::Json => Arc::new(JsonFileRepository::new(&config.data_dir)?),
        StorageBackend::Memory => {
            warn!("⚠️  In-memory repository: history is lost on shutdown");
            Arc::new(InMemorySeriesRepository::new())
        }
    };
    Ok(repository)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::init();

    info!("🚀 History Runtime");

    let config = RuntimeConfig::from_env();

    if !config.collector_enabled {
        info!("⚠️  Collector is DISABLED (set ENABLE_COLLECTOR=true to activate)");
        info!("   └─ Exiting gracefully...");
        return Ok(());
    }

    info!("✅ Collector ENABLED");
    info!("   ├─ Storage: {:?}", config.storage);
    info!("   ├─ Collect interval: {}s", config.collect_interval_secs);
    info!("   ├─ Pause retry: {}ms", config.pause_retry_ms);
    info!("   ├─ Selection: daily at {:02}:00 UTC", config.selection_hour_utc);
    info!(
        "   ├─ Pinned: {}",
        config.pinned.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    info!("   └─ Market data: {}", config.upbit_api_url);

    // Initialize storage
    let repository = open_repository(&config)?;
    let store = Arc::new(SeriesStore::new(repository));

    let source: Arc<dyn MarketDataSource> = Arc::new(UpbitSource::new(&config.upbit_api_url)?);
    let holdings: Arc<dyn HoldingsProvider> = Arc::new(StaticHoldings::new(config.held.clone()));

    // Initial tracked set: pinned + held
    let initial: Vec<String> = config.pinned.union(&config.held).cloned().collect();
    let tracked = Arc::new(TrackedSet::new(initial.clone()));

    info!("🔧 Hydrating {} tracked instruments...", initial.len());
    for instrument in &initial {
        if let Err(e) = store.hydrate(instrument) {
            error!("❌ Failed to hydrate {}: {}", instrument, e);
            continue;
        }
        let empty = store.snapshot(instrument).map_or(true, |s| s.is_empty());
        if empty {
            backfill_instrument(&store, source.as_ref(), instrument).await;
        }
        let rsi = rsi_snapshot(&store, instrument);
        info!(
            "   ├─ {} RSI detailed={:?} hourly={:?} daily={:?}",
            instrument, rsi.detailed, rsi.hourly, rsi.daily
        );
        let trends = multi_period_trends(&store, instrument, chrono::Utc::now().timestamp());
        if let Some(day) = trends.short_term {
            info!(
                "   │  └─ 24h {} {:+.2}% ({} points)",
                day.direction.as_str(),
                day.change_rate,
                day.data_points
            );
        }
    }

    // Spawn background tasks
    info!("🚀 Spawning background tasks...");

    let collector = tokio::spawn(collector_task(
        store.clone(),
        source.clone(),
        tracked.clone(),
        config.collect_interval_secs,
        config.pause_retry_ms,
    ));
    info!("   ├─ ✅ Collector task spawned");

    let scheduler = tokio::spawn(selection_task(
        store.clone(),
        source.clone(),
        holdings.clone(),
        config.pinned.clone(),
        tracked.clone(),
        config.selection_hour_utc,
    ));
    info!("   └─ ✅ Selection scheduler spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    // Wait for CTRL+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    // Every append is already persisted; nothing to flush
    collector.abort();
    scheduler.abort();

    info!("✅ History runtime stopped ({} series resident)", store.instruments().len());
    Ok(())
}
