//! # Sensor Packet Decoder
//!
//! Decodes raw notification bytes into [`SensorSample`]s.

use thiserror::Error;

use super::protocol::*;

/// Reasons a notification could not be turned into a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than one packet
    #[error("short packet: {len} bytes (expected {expected})")]
    ShortPacket { len: usize, expected: usize },

    /// A partial frame followed one or more complete frames
    #[error("truncated packet: {available} of {expected} bytes before frame boundary")]
    TruncatedPacket { available: usize, expected: usize },
}

/// Decode one sensor packet
///
/// # Arguments
///
/// * `bytes` - Notification payload. Normally exactly [`PACKET_SIZE`] bytes.
///
/// # Returns
///
/// * `Result<SensorSample, DecodeError>` - Decoded sample
///
/// # Errors
///
/// - `ShortPacket` if fewer than 16 bytes are supplied
/// - `TruncatedPacket` if the buffer is longer than one frame but does not
///   end on a frame boundary
///
/// # Examples
///
/// ```
/// use imu_mouse_bridge::packet::{decode, DecodeError};
///
/// let mut bytes = [0u8; 16];
/// bytes[0..2].copy_from_slice(&150i16.to_le_bytes());
/// let sample = decode(&bytes)?;
/// assert!((sample.accel[0] - 1.5).abs() < f32::EPSILON);
///
/// assert!(matches!(decode(&bytes[..10]), Err(DecodeError::ShortPacket { .. })));
/// # Ok::<(), DecodeError>(())
/// ```
pub fn decode(bytes: &[u8]) -> Result<SensorSample, DecodeError> {
    if bytes.len() < PACKET_SIZE {
        return Err(DecodeError::ShortPacket {
            len: bytes.len(),
            expected: PACKET_SIZE,
        });
    }

    let remainder = bytes.len() % PACKET_SIZE;
    if remainder != 0 {
        return Err(DecodeError::TruncatedPacket {
            available: remainder,
            expected: PACKET_SIZE,
        });
    }

    Ok(decode_frame(&bytes[..PACKET_SIZE]))
}

/// Decode a buffer holding one or more back-to-back packets
///
/// Some transports coalesce notifications. Every complete frame is yielded
/// in order; a trailing fragment is reported as `TruncatedPacket` after
/// the complete frames. A buffer shorter than one frame yields a single
/// `ShortPacket`.
pub fn decode_frames(bytes: &[u8]) -> Vec<Result<SensorSample, DecodeError>> {
    if bytes.len() < PACKET_SIZE {
        return vec![Err(DecodeError::ShortPacket {
            len: bytes.len(),
            expected: PACKET_SIZE,
        })];
    }

    let chunks = bytes.chunks_exact(PACKET_SIZE);
    let trailing = chunks.remainder().len();

    let mut results: Vec<_> = chunks.map(|frame| Ok(decode_frame(frame))).collect();
    if trailing > 0 {
        results.push(Err(DecodeError::TruncatedPacket {
            available: trailing,
            expected: PACKET_SIZE,
        }));
    }

    results
}

/// Decode a slice known to be exactly one frame long
fn decode_frame(frame: &[u8]) -> SensorSample {
    debug_assert_eq!(frame.len(), PACKET_SIZE);

    let read_i16 = |offset: usize| i16::from_le_bytes([frame[offset], frame[offset + 1]]);

    let accel = [
        read_i16(OFFSET_ACCEL) as f32 / ACCEL_SCALE,
        read_i16(OFFSET_ACCEL + 2) as f32 / ACCEL_SCALE,
        read_i16(OFFSET_ACCEL + 4) as f32 / ACCEL_SCALE,
    ];
    let gyro = [
        read_i16(OFFSET_GYRO) as f32 / GYRO_SCALE,
        read_i16(OFFSET_GYRO + 2) as f32 / GYRO_SCALE,
        read_i16(OFFSET_GYRO + 4) as f32 / GYRO_SCALE,
    ];

    SensorSample {
        accel,
        gyro,
        button_state: frame[OFFSET_BUTTON],
        timestamp: u16::from_le_bytes([frame[OFFSET_TIMESTAMP], frame[OFFSET_TIMESTAMP + 1]]),
    }
}
