//! # Sensor Packet Layout and Types
//!
//! Core wire definitions shared with the peripheral firmware.
//!
//! ```text
//! Offset  Field         Type  Unit
//!  0      accel_x       i16   g x 100
//!  2      accel_y       i16   g x 100
//!  4      accel_z       i16   g x 100
//!  6      gyro_x        i16   deg/s x 10
//!  8      gyro_y        i16   deg/s x 10
//! 10      gyro_z        i16   deg/s x 10
//! 12      button_state  u8    0/1/2
//! 13      padding       u8    reserved
//! 14      timestamp     u16   ms, wraps at 65536
//! ```
//!
//! All multi-byte fields are little-endian.

use serde::Serialize;

/// Size of one packet on the wire
pub const PACKET_SIZE: usize = 16;

/// Accelerometer raw units per g
pub const ACCEL_SCALE: f32 = 100.0;

/// Gyroscope raw units per deg/s
pub const GYRO_SCALE: f32 = 10.0;

/// Field offsets
pub const OFFSET_ACCEL: usize = 0;
pub const OFFSET_GYRO: usize = 6;
pub const OFFSET_BUTTON: usize = 12;
pub const OFFSET_PADDING: usize = 13;
pub const OFFSET_TIMESTAMP: usize = 14;

/// Button codes reported by the firmware
pub const BUTTON_NONE: u8 = 0;
pub const BUTTON_SHORT: u8 = 1;
pub const BUTTON_LONG: u8 = 2;

/// One decoded IMU sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    /// Acceleration in g (x, y, z)
    pub accel: [f32; 3],

    /// Angular rate in deg/s (x, y, z)
    pub gyro: [f32; 3],

    /// Button code (0 = none, 1 = short press, 2 = long press)
    pub button_state: u8,

    /// Device millisecond counter, wraps every 65.536 s
    pub timestamp: u16,
}

impl Default for SensorSample {
    /// A device lying flat and still: 1 g on Z, no rotation.
    fn default() -> Self {
        Self {
            accel: [0.0, 0.0, 1.0],
            gyro: [0.0; 3],
            button_state: BUTTON_NONE,
            timestamp: 0,
        }
    }
}

impl SensorSample {
    /// Milliseconds elapsed on the device clock since `previous`.
    ///
    /// The counter wraps at 65536, so the difference is computed with
    /// wrapping arithmetic: a sample stamped 10 following one stamped 65530
    /// is 16 ms later, not 65520 ms earlier.
    ///
    /// # Examples
    ///
    /// ```
    /// use imu_mouse_bridge::packet::SensorSample;
    ///
    /// let earlier = SensorSample { timestamp: 65_530, ..Default::default() };
    /// let later = SensorSample { timestamp: 10, ..Default::default() };
    /// assert_eq!(later.millis_since(&earlier), 16);
    /// ```
    #[must_use]
    pub fn millis_since(&self, previous: &SensorSample) -> u16 {
        self.timestamp.wrapping_sub(previous.timestamp)
    }
}
