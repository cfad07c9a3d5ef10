//! JSONL sample recorder
//!
//! One JSON object per line:
//!
//! ```json
//! {"time":"2024-05-01T12:00:00.020Z","accel":[0.0,0.5,0.87],"gyro":[1.5,0.0,0.0],"button_state":0,"timestamp":20}
//! ```
//!
//! Files are named `samples_<YYYYmmdd_HHMMSS>_<seq>.jsonl`, so lexical order
//! is creation order.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::{BridgeError, Result};
use crate::packet::SensorSample;

const FILE_PREFIX: &str = "samples_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Serialize)]
struct SampleRecord<'a> {
    time: String,
    #[serde(flatten)]
    sample: &'a SensorSample,
}

/// Rate-limited, rotating sample recorder
///
/// Any I/O failure disables the recorder for the rest of the run; the
/// bridge keeps working without it.
pub struct SampleRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    interval: Duration,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_seq: u64,
    last_record: Option<Instant>,
    disabled: bool,
}

impl SampleRecorder {
    /// Create a recorder writing into `config.log_dir`
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Telemetry` if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir).map_err(|e| {
            BridgeError::Telemetry(format!("Cannot create {}: {}", dir.display(), e))
        })?;

        info!("Recording samples to {}", dir.display());
        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            interval: Duration::from_millis(config.log_interval_ms),
            writer: None,
            records_in_file: 0,
            file_seq: 0,
            last_record: None,
            disabled: false,
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Record a sample if the rate limit allows
    pub fn record(&mut self, sample: &SensorSample) {
        self.record_at(sample, Instant::now());
    }

    /// Record a sample as of `now`
    ///
    /// # Returns
    ///
    /// `true` if the sample was written
    pub fn record_at(&mut self, sample: &SensorSample, now: Instant) -> bool {
        if self.disabled {
            return false;
        }
        if let Some(last) = self.last_record {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }

        match self.write(sample) {
            Ok(()) => {
                self.last_record = Some(now);
                true
            }
            Err(e) => {
                warn!("Sample recorder disabled: {}", e);
                self.disabled = true;
                self.writer = None;
                false
            }
        }
    }

    /// Flush buffered records
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush sample file: {}", e);
            }
        }
    }

    fn write(&mut self, sample: &SensorSample) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = SampleRecord {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            sample,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| BridgeError::Telemetry(e.to_string()))?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| BridgeError::Telemetry("No open sample file".to_string()))?;
        writeln!(writer, "{}", line)?;

        self.records_in_file += 1;
        Ok(())
    }

    /// Close the current file, open the next and prune old ones
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_SUFFIX
        );
        self.file_seq += 1;

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened sample file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        prune(&self.dir, self.max_files_to_keep)
    }
}

impl Drop for SampleRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Sample files in `dir`, oldest first
fn sample_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn prune(dir: &Path, keep: usize) -> Result<()> {
    let files = sample_files(dir)?;
    let excess = files.len().saturating_sub(keep);
    for path in &files[..excess] {
        debug!("Removing old sample file {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(())
}
