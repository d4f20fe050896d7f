//! SQLite series repository
//!
//! Tables written (see `/sql/` directory):
//! - `series_meta` - one row per instrument, carries the watermark
//! - `series_detailed` - raw samples
//! - `series_hourly` - hourly bars
//! - `series_daily` - daily bars
//!
//! `save` replaces all rows of one instrument inside a single transaction,
//! so readers of the database never observe a half-written series.

use super::error::{HistoryError, HistoryResult};
use super::repository::SeriesRepository;
use super::types::{DailyBar, HourlyBar, Sample, Series};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Run schema migrations from SQL files
///
/// Reads every `.sql` file in `schema_dir` in file-name order and executes
/// it. All files must use `IF NOT EXISTS` clauses so the loader can run on
/// every startup.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> HistoryResult<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(HistoryError::Persistence(format!(
            "Schema directory not found: {}",
            schema_dir
        )));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for path in sql_files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

pub struct SqliteSeriesRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSeriesRepository {
    /// Open `db_path` (created if missing) and apply the schema in `schema_dir`
    pub fn open(db_path: &str, schema_dir: &str) -> HistoryResult<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn, schema_dir)?;
        log::info!("🗄️  SQLite series repository at {}", db_path);

        Ok(Self::from_connection(conn))
    }

    /// Wrap a connection whose schema is already in place
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> HistoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HistoryError::Persistence("SQLite connection lock poisoned".into()))
    }
}

impl SeriesRepository for SqliteSeriesRepository {
    fn load(&self, instrument: &str) -> HistoryResult<Option<Series>> {
        let conn = self.lock()?;

        let watermark: Option<Option<i64>> = conn
            .query_row(
                "SELECT watermark FROM series_meta WHERE instrument = ?",
                [instrument],
                |row| row.get(0),
            )
            .optional()?;

        let Some(watermark) = watermark else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT timestamp, price, volume FROM series_detailed
             WHERE instrument = ? ORDER BY timestamp",
        )?;
        let detailed = stmt
            .query_map([instrument], |row| {
                Ok(Sample {
                    timestamp: row.get(0)?,
                    price: row.get(1)?,
                    volume: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT period_start, open, high, low, close, count, volume FROM series_hourly
             WHERE instrument = ? ORDER BY period_start",
        )?;
        let hourly = stmt
            .query_map([instrument], |row| {
                Ok(HourlyBar {
                    period_start: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    count: row.get(5)?,
                    volume: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT period_start, open, high, low, close, count FROM series_daily
             WHERE instrument = ? ORDER BY period_start",
        )?;
        let daily = stmt
            .query_map([instrument], |row| {
                Ok(DailyBar {
                    period_start: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    count: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Loaded {} from SQLite ({} detailed, {} hourly, {} daily)",
            instrument,
            detailed.len(),
            hourly.len(),
            daily.len()
        );

        Ok(Some(Series {
            instrument: instrument.to_string(),
            detailed,
            hourly,
            daily,
            watermark,
        }))
    }

    fn save(&self, series: &Series) -> HistoryResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let instrument = series.instrument.as_str();

        tx.execute("DELETE FROM series_detailed WHERE instrument = ?", [instrument])?;
        tx.execute("DELETE FROM series_hourly WHERE instrument = ?", [instrument])?;
        tx.execute("DELETE FROM series_daily WHERE instrument = ?", [instrument])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO series_detailed (instrument, timestamp, price, volume)
                 VALUES (?, ?, ?, ?)",
            )?;
            for s in &series.detailed {
                stmt.execute(params![instrument, s.timestamp, s.price, s.volume])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO series_hourly
                    (instrument, period_start, open, high, low, close, count, volume)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for bar in &series.hourly {
                stmt.execute(params![
                    instrument,
                    bar.period_start,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.count,
                    bar.volume,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO series_daily
                    (instrument, period_start, date, open, high, low, close, count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for bar in &series.daily {
                let date = bar.date().map(|d| d.to_string()).unwrap_or_default();
                stmt.execute(params![
                    instrument,
                    bar.period_start,
                    date,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.count,
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO series_meta (instrument, watermark, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(instrument) DO UPDATE SET
                watermark = excluded.watermark,
                updated_at = excluded.updated_at
            "#,
            params![instrument, series.watermark, chrono::Utc::now().timestamp()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
