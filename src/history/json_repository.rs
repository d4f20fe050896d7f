//! Flat-file series repository
//!
//! One pretty-printed JSON document per instrument under `data_dir`.
//! File names keep ASCII alphanumerics and `-`; every other byte is written
//! as `_XX` (hex), so distinct instruments never share a file.
//! Writes go to a temporary file first and are renamed into place, so a
//! crash mid-save never leaves a truncated series behind.

use super::error::{HistoryError, HistoryResult};
use super::repository::SeriesRepository;
use super::types::Series;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonFileRepository {
    data_dir: PathBuf,
}

impl JsonFileRepository {
    /// Open (and create if needed) the snapshot directory
    pub fn new(data_dir: impl AsRef<Path>) -> HistoryResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        log::info!("📂 JSON series repository at {}", data_dir.display());
        Ok(Self { data_dir })
    }

    fn path_for(&self, instrument: &str) -> PathBuf {
        let mut file_name = String::with_capacity(instrument.len() + 5);
        for byte in instrument.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                file_name.push(byte as char);
            } else {
                file_name.push_str(&format!("_{:02X}", byte));
            }
        }
        file_name.push_str(".json");
        self.data_dir.join(file_name)
    }
}

impl SeriesRepository for JsonFileRepository {
    fn load(&self, instrument: &str) -> HistoryResult<Option<Series>> {
        let path = self.path_for(instrument);
        if !path.exists() {
            log::debug!("No series file for {}: {}", instrument, path.display());
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let series: Series = serde_json::from_str(&json)?;

        if series.instrument != instrument {
            return Err(HistoryError::Persistence(format!(
                "{} holds series for {}, expected {}",
                path.display(),
                series.instrument,
                instrument
            )));
        }

        log::debug!(
            "Loaded {} ({} detailed, {} hourly, {} daily) from {}",
            instrument,
            series.detailed.len(),
            series.hourly.len(),
            series.daily.len(),
            path.display()
        );
        Ok(Some(series))
    }

    fn save(&self, series: &Series) -> HistoryResult<()> {
        let path = self.path_for(&series.instrument);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(series)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "json"
    }
}
