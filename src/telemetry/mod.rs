//! # Telemetry Module
//!
//! Records decoded sensor samples to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting samples as JSONL (JSON Lines)
//! - Rate limiting to `log_interval_ms`
//! - Managing file rotation (max N records per file)
//! - Retaining only the last M files

pub mod recorder;

pub use recorder::SampleRecorder;
