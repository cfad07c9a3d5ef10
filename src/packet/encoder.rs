//! # Sensor Packet Encoder
//!
//! Encodes samples into the wire layout the firmware produces. The bridge
//! itself only decodes; the simulated transport and the tests use this.

use super::protocol::*;

/// Encode a sample into a 16-byte wire packet
///
/// Values are rounded to the nearest raw unit and saturate at the `i16`
/// range. The padding byte is always zero.
///
/// # Examples
///
/// ```
/// use imu_mouse_bridge::packet::{encode, SensorSample};
///
/// let sample = SensorSample { accel: [1.5, 0.0, 1.0], ..Default::default() };
/// let bytes = encode(&sample);
/// assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 150);
/// ```
#[must_use]
pub fn encode(sample: &SensorSample) -> [u8; PACKET_SIZE] {
    let mut bytes = [0u8; PACKET_SIZE];

    for (axis, value) in sample.accel.iter().enumerate() {
        let offset = OFFSET_ACCEL + axis * 2;
        bytes[offset..offset + 2].copy_from_slice(&to_raw(*value, ACCEL_SCALE).to_le_bytes());
    }
    for (axis, value) in sample.gyro.iter().enumerate() {
        let offset = OFFSET_GYRO + axis * 2;
        bytes[offset..offset + 2].copy_from_slice(&to_raw(*value, GYRO_SCALE).to_le_bytes());
    }

    bytes[OFFSET_BUTTON] = sample.button_state;
    bytes[OFFSET_PADDING] = 0;
    bytes[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 2].copy_from_slice(&sample.timestamp.to_le_bytes());

    bytes
}

/// Scale a physical value to its saturating raw representation
#[inline]
fn to_raw(value: f32, scale: f32) -> i16 {
    // `as` saturates for out-of-range floats and maps NaN to 0
    (value * scale).round() as i16
}
