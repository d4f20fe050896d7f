//! Runtime configuration from environment variables

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;

/// Where series are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Json,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "json" => Ok(StorageBackend::Json),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Configuration for the history runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub storage: StorageBackend,

    /// SQLite database file (sqlite backend)
    pub db_path: String,

    /// Snapshot directory (json backend)
    pub data_dir: String,

    /// Directory holding the `.sql` schema files
    pub schema_dir: String,

    /// Seconds between collection cycles
    pub collect_interval_secs: u64,

    /// Delay before retrying a cycle deferred by a paused store
    pub pause_retry_ms: u64,

    /// UTC hour of the daily selection run
    pub selection_hour_utc: u32,

    /// Always tracked, regardless of selection filters
    pub pinned: BTreeSet<String>,

    /// Instruments held by the account
    pub held: BTreeSet<String>,

    pub upbit_api_url: String,

    /// Master enable flag for the collector and scheduler
    pub collector_enabled: bool,
}

fn default_pinned() -> BTreeSet<String> {
    ["KRW-BTC", "KRW-ETH", "KRW-XRP", "KRW-ADA", "KRW-SOL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn parse_list(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TICKFLOW_STORAGE` (sqlite | json | memory, default: sqlite)
    /// - `TICKFLOW_DB_PATH` (default: data/tickflow.db)
    /// - `TICKFLOW_DATA_DIR` (default: data/price_history)
    /// - `TICKFLOW_SCHEMA_DIR` (default: sql)
    /// - `COLLECT_INTERVAL_SECS` (default: 600)
    /// - `PAUSE_RETRY_MS` (default: 500)
    /// - `SELECTION_HOUR_UTC` (default: 0)
    /// - `PINNED_TICKERS` (comma-separated, default: five majors)
    /// - `HELD_TICKERS` (comma-separated, default: none)
    /// - `UPBIT_API_URL` (default: https://api.upbit.com)
    /// - `ENABLE_COLLECTOR` (default: true)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let storage = match lookup("TICKFLOW_STORAGE") {
            Some(value) => value.parse::<StorageBackend>().unwrap_or_else(|e| {
                log::warn!("⚠️  {}, using sqlite", e);
                StorageBackend::Sqlite
            }),
            None => StorageBackend::Sqlite,
        };

        Self {
            storage,

            db_path: lookup("TICKFLOW_DB_PATH").unwrap_or_else(|| "data/tickflow.db".to_string()),

            data_dir: lookup("TICKFLOW_DATA_DIR")
                .unwrap_or_else(|| "data/price_history".to_string()),

            schema_dir: lookup("TICKFLOW_SCHEMA_DIR").unwrap_or_else(|| "sql".to_string()),

            collect_interval_secs: lookup("COLLECT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .unwrap_or(600),

            pause_retry_ms: lookup("PAUSE_RETRY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),

            selection_hour_utc: lookup("SELECTION_HOUR_UTC")
                .and_then(|s| s.parse().ok())
                .filter(|&hour: &u32| hour < 24)
                .unwrap_or(0),

            pinned: lookup("PINNED_TICKERS")
                .map(|s| parse_list(&s))
                .unwrap_or_else(default_pinned),

            held: lookup("HELD_TICKERS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),

            upbit_api_url: lookup("UPBIT_API_URL")
                .unwrap_or_else(|| "https://api.upbit.com".to_string()),

            collector_enabled: lookup("ENABLE_COLLECTOR")
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> RuntimeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);

        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.db_path, "data/tickflow.db");
        assert_eq!(config.data_dir, "data/price_history");
        assert_eq!(config.schema_dir, "sql");
        assert_eq!(config.collect_interval_secs, 600);
        assert_eq!(config.pause_retry_ms, 500);
        assert_eq!(config.selection_hour_utc, 0);
        assert_eq!(config.pinned.len(), 5);
        assert!(config.pinned.contains("KRW-BTC"));
        assert!(config.held.is_empty());
        assert_eq!(config.upbit_api_url, "https://api.upbit.com");
        assert!(config.collector_enabled);
    }

    #[test]
    fn test_custom_config() {
        let config = config_from(&[
            ("TICKFLOW_STORAGE", "JSON"),
            ("COLLECT_INTERVAL_SECS", "60"),
            ("SELECTION_HOUR_UTC", "3"),
            ("PINNED_TICKERS", "KRW-BTC, KRW-ETH,,"),
            ("HELD_TICKERS", "KRW-DOGE"),
            ("ENABLE_COLLECTOR", "false"),
        ]);

        assert_eq!(config.storage, StorageBackend::Json);
        assert_eq!(config.collect_interval_secs, 60);
        assert_eq!(config.selection_hour_utc, 3);
        assert_eq!(config.pinned.len(), 2);
        assert!(config.held.contains("KRW-DOGE"));
        assert!(!config.collector_enabled);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("TICKFLOW_STORAGE", "redis"),
            ("COLLECT_INTERVAL_SECS", "0"),
            ("SELECTION_HOUR_UTC", "25"),
            ("PAUSE_RETRY_MS", "soon"),
        ]);

        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.collect_interval_secs, 600);
        assert_eq!(config.selection_hour_utc, 0);
        assert_eq!(config.pause_retry_ms, 500);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(" Memory ".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
