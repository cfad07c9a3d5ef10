//! # Sensor Packet Module
//!
//! Implementation of the fixed 16-byte wire packet sent by the IMU peripheral.
//!
//! This module handles:
//! - Packet layout and scaling constants
//! - Decoding and validating raw notification bytes into [`protocol::SensorSample`]
//! - Encoding samples back to wire bytes (simulator and tests)

pub mod protocol;
pub mod decoder;
pub mod encoder;

pub use decoder::{decode, decode_frames, DecodeError};
pub use encoder::encode;
pub use protocol::SensorSample;
