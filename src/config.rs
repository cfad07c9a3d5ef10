//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every key is optional; anything left out takes the
//! default below. Unknown keys are ignored so older files keep loading.

use serde::de::Error;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::motion::filter::FilterKind;
use crate::motion::mapper::{MAX_SCROLL_SAMPLES, MIN_SCROLL_SAMPLES};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/imu-mouse-bridge.toml";

/// Longest name uinput accepts (UINPUT_MAX_NAME_SIZE minus the NUL)
const MAX_DEVICE_NAME_LEN: usize = 79;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub motion: MotionConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pointer motion tuning
///
/// Read-only for the duration of a streaming session. A reloaded value is
/// picked up the next time the link enters `Streaming`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MotionConfig {
    /// Pixels per second per degree of tilt
    #[serde(default = "default_movement_sensitivity")]
    pub movement_sensitivity: f32,

    /// Wheel notches per tick per deg/s of twist
    #[serde(default = "default_scroll_sensitivity")]
    pub scroll_sensitivity: f32,

    /// Tilt (degrees) below which an axis is ignored
    #[serde(default = "default_dead_zone")]
    pub dead_zone: f32,

    /// Smoothed twist rate (deg/s) required before scrolling
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f32,

    #[serde(default)]
    pub invert_x: bool,

    #[serde(default)]
    pub invert_y: bool,

    #[serde(default)]
    pub invert_scroll: bool,

    /// Moving-average window for the scroll axis, clamped to 1..=10
    #[serde(
        default = "default_scroll_filter_samples",
        deserialize_with = "deserialize_scroll_filter_samples"
    )]
    pub scroll_filter_samples: usize,

    #[serde(default)]
    pub filter: FilterKind,
}

/// Connection lifecycle settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LinkConfig {
    /// An advertisement matches if its name contains any of these
    #[serde(default = "default_device_names")]
    pub device_names: Vec<String>,

    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,

    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    #[serde(default = "default_scan_retry_delay_ms")]
    pub scan_retry_delay_ms: u64,

    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Pause between connecting and subscribing
    #[serde(default = "default_connect_settle_ms")]
    pub connect_settle_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How long shutdown may take before the process is killed
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Which packet source feeds the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Built-in motion generator, no hardware needed
    #[default]
    Simulated,
    /// Bluetooth Low Energy (requires the `ble` feature)
    Ble,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Simulated => write!(f, "simulated"),
            TransportKind::Ble => write!(f, "ble"),
        }
    }
}

/// Transport selection
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Simulated link drops after this many packets (testing reconnects)
    #[serde(default)]
    pub simulated_drop_after: Option<u64>,
}

/// Virtual pointer device identity
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_device_name")]
    pub device_name: String,

    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

/// Sample recorder configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct LoggingConfig {
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_movement_sensitivity() -> f32 { 10.0 }
fn default_scroll_sensitivity() -> f32 { 0.005 }
fn default_dead_zone() -> f32 { 3.0 }
fn default_scroll_threshold() -> f32 { 30.0 }
fn default_scroll_filter_samples() -> usize { 5 }

/// Any integer is accepted and brought into 1..=10 with a warning
fn deserialize_scroll_filter_samples<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let samples = i64::deserialize(deserializer)?;
    let min = MIN_SCROLL_SAMPLES as i64;
    let max = MAX_SCROLL_SAMPLES as i64;
    let clamped = samples.clamp(min, max);
    if clamped != samples {
        warn!("scroll_filter_samples {} out of range, using {}", samples, clamped);
    }
    // In 1..=10 after the clamp
    Ok(clamped as usize)
}

fn default_device_names() -> Vec<String> { vec!["M5".to_string(), "Mouse".to_string()] }
fn default_service_uuid() -> String { "12345678-1234-1234-1234-123456789abc".to_string() }
fn default_characteristic_uuid() -> String { "87654321-4321-4321-4321-cba987654321".to_string() }
fn default_scan_window_ms() -> u64 { 5000 }
fn default_scan_retry_delay_ms() -> u64 { 5000 }
fn default_connect_retry_delay_ms() -> u64 { 5000 }
fn default_reconnect_delay_ms() -> u64 { 2000 }
fn default_connect_settle_ms() -> u64 { 2000 }
fn default_tick_interval_ms() -> u64 { 20 }
fn default_shutdown_grace_ms() -> u64 { 2000 }

fn default_output_device_name() -> String { "M5 Matrix IMU Mouse".to_string() }
fn default_vendor_id() -> u16 { 0x045E }
fn default_product_id() -> u16 { 0x0823 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            movement_sensitivity: default_movement_sensitivity(),
            scroll_sensitivity: default_scroll_sensitivity(),
            dead_zone: default_dead_zone(),
            scroll_threshold: default_scroll_threshold(),
            invert_x: false,
            invert_y: false,
            invert_scroll: false,
            scroll_filter_samples: default_scroll_filter_samples(),
            filter: FilterKind::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_names: default_device_names(),
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            scan_window_ms: default_scan_window_ms(),
            scan_retry_delay_ms: default_scan_retry_delay_ms(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_settle_ms: default_connect_settle_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl LinkConfig {
    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn scan_retry_delay(&self) -> Duration {
        Duration::from_millis(self.scan_retry_delay_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// True if an advertised name matches any configured identifier
    pub fn matches_name(&self, name: &str) -> bool {
        self.device_names.iter().any(|id| name.contains(id.as_str()))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: default_output_device_name(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
        }
    }
}

fn config_error(msg: impl Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

/// Checks the canonical 8-4-4-4-12 hex layout
fn is_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 36
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => *b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded, clamped and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_mouse_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Like [`Config::load`], but a missing file means defaults
    ///
    /// A file that exists but does not parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse, clamp and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Motion tuning must be finite and non-negative
        for (name, value) in [
            ("movement_sensitivity", self.motion.movement_sensitivity),
            ("scroll_sensitivity", self.motion.scroll_sensitivity),
            ("dead_zone", self.motion.dead_zone),
            ("scroll_threshold", self.motion.scroll_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }

        // Device matching
        if self.link.device_names.is_empty() {
            return Err(config_error("device_names cannot be empty"));
        }
        if self.link.device_names.iter().any(|name| name.is_empty()) {
            return Err(config_error("device_names cannot contain an empty name"));
        }

        for (name, value) in [
            ("service_uuid", &self.link.service_uuid),
            ("characteristic_uuid", &self.link.characteristic_uuid),
        ] {
            if !is_uuid(value) {
                return Err(config_error(format!(
                    "{} '{}' is not a valid UUID",
                    name, value
                )));
            }
        }

        // Timing fields
        if self.link.scan_window_ms < 100 || self.link.scan_window_ms > 60000 {
            return Err(config_error("scan_window_ms must be between 100 and 60000"));
        }

        for (name, value) in [
            ("scan_retry_delay_ms", self.link.scan_retry_delay_ms),
            ("connect_retry_delay_ms", self.link.connect_retry_delay_ms),
            ("reconnect_delay_ms", self.link.reconnect_delay_ms),
            ("shutdown_grace_ms", self.link.shutdown_grace_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(config_error(format!(
                    "{} must be between 1 and 60000",
                    name
                )));
            }
        }

        if self.link.connect_settle_ms > 10000 {
            return Err(config_error("connect_settle_ms must be at most 10000"));
        }

        if self.link.tick_interval_ms == 0 || self.link.tick_interval_ms > 1000 {
            return Err(config_error("tick_interval_ms must be between 1 and 1000"));
        }

        // Output device
        if self.output.device_name.is_empty() {
            return Err(config_error("output device_name cannot be empty"));
        }
        if self.output.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(config_error(format!(
                "output device_name must be at most {} bytes",
                MAX_DEVICE_NAME_LEN
            )));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(config_error("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(config_error("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(config_error("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(config_error("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}
