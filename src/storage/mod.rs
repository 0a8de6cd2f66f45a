//! Durable history of finished runs.
//!
//! Every run is written as one pretty-printed JSON document. A [`History`]
//! keeps only the most recent runs in its directory. Results can also be
//! exported as a flat CSV table with [`save_csv`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::http_probe::result::CheckResult;
use crate::stats::Statistics;

/// One finished run as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<CheckResult>,
    pub statistics: Statistics,
}

impl RunRecord {
    pub fn new(results: Vec<CheckResult>, statistics: Statistics) -> Self {
        Self {
            timestamp: Utc::now(),
            results,
            statistics,
        }
    }
}

const CSV_HEADER: [&str; 8] = [
    "URL",
    "Status Code",
    "Success",
    "Response Time (ms)",
    "Latency (ms)",
    "Error",
    "Error Message",
    "Timestamp",
];

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    Ok(())
}

/// Writes `record` to `path`, creating missing parent directories.
pub fn save_json(record: &RunRecord, path: &Path) -> Result<()> {
    create_parent(path)?;
    let json = serde_json::to_vec_pretty(record)?;
    fs::write(path, json).map_err(|e| Error::io(path, e))
}

/// Writes one CSV row per result to `path`, creating missing parent
/// directories. A missing status code is left empty.
pub fn save_csv(results: &[CheckResult], path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(CSV_HEADER)?;
    for result in results {
        wtr.write_record([
            result.url.clone(),
            result.status_code.map(|code| code.to_string()).unwrap_or_default(),
            result.success.to_string(),
            format!("{:.2}", result.response_time_ms()),
            format!("{:.2}", result.latency_ms()),
            result.error.map(|kind| kind.as_str().to_string()).unwrap_or_default(),
            result.error_message.clone().unwrap_or_default(),
            result.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        ])?;
    }
    wtr.flush().map_err(|e| Error::io(path, e))
}

#[derive(Debug, Clone)]
pub struct History {
    dir: PathBuf,
    keep: usize,
}

impl History {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(&config.dir, config.keep)
    }

    /// Stores `record` and drops runs beyond the retention limit.
    ///
    /// Failing to drop old runs is logged; the new run is kept either way.
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        let filename = format!(
            "results_{}.json",
            record.timestamp.format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.dir.join(filename);
        save_json(record, &path)?;

        if let Err(e) = self.prune() {
            log::warn!("Failed to clean up old results in {}: {e}", self.dir.display());
        }
        Ok(path)
    }

    /// Removes all but the `keep` most recent run files.
    pub fn prune(&self) -> Result<()> {
        for (path, _) in self.run_files()?.into_iter().skip(self.keep) {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }

    /// Returns every readable run, newest first.
    ///
    /// Files that cannot be read or parsed are skipped. A missing directory
    /// means there is no history yet.
    pub fn load(&self) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();
        for (path, _) in self.run_files()? {
            let record = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<RunRecord>(&bytes).ok());
            match record {
                Some(record) => records.push(record),
                None => log::debug!("Skipping unreadable run file {}", path.display()),
            }
        }
        Ok(records)
    }

    /// JSON files in the history directory, newest first.
    fn run_files(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };

        let mut files: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let metadata = entry.metadata().ok()?;
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                (metadata.is_file() && is_json)
                    .then(|| (path, metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)))
            })
            .collect();

        files.sort_by(|(a_path, a_time), (b_path, b_time)| {
            b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
        });
        Ok(files)
    }
}
