//! # Simulated Transport
//!
//! A stand-in peripheral for running the bridge without hardware.
//!
//! Produces packets at 50 Hz following a fixed script: a slow figure-eight
//! tilt, a short click every 10 s, a long press that escalates from the
//! short code, and a twist burst that scrolls. Optionally drops the link
//! after a number of packets to exercise reconnects.

use async_trait::async_trait;
use bytes::Bytes;
use std::f32::consts::TAU;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::state::DeviceHandle;
use super::transport::{Advertisement, GattTarget, Transport, TransportError};
use crate::packet::encode;
use crate::packet::protocol::{SensorSample, BUTTON_LONG, BUTTON_NONE, BUTTON_SHORT};

/// Name the simulated peripheral advertises
pub const SIMULATED_NAME: &str = "M5-Mouse-Controller";

/// Address the simulated peripheral reports
pub const SIMULATED_ID: &str = "5E:1F:00:00:00:01";

/// Sample period of the simulated firmware
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(20);

/// Script length in samples (10 s)
const CYCLE: u64 = 500;

/// Packets produced per poll burst before the generator skips ahead
const MAX_BACKLOG: u64 = 10;

/// Simulated peripheral
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    drop_after: Option<u64>,
    connected: bool,
    streaming_since: Option<Instant>,
    /// Index of the next sample to generate
    next_index: u64,
    /// Packets delivered on the current connection
    delivered: u64,
}

impl SimulatedTransport {
    pub fn new(drop_after: Option<u64>) -> Self {
        Self {
            drop_after,
            ..Self::default()
        }
    }

    /// The `index`-th sample of the script
    pub fn sample(index: u64) -> SensorSample {
        let phase = (index % CYCLE) as f32 / CYCLE as f32;
        let roll = 20.0 * (TAU * phase).sin();
        let pitch = 12.0 * (2.0 * TAU * phase).sin();

        // Angular rate is the derivative of the script angles (deg/s)
        let period_s = CYCLE as f32 * SAMPLE_PERIOD.as_secs_f32();
        let roll_rate = 20.0 * TAU / period_s * (TAU * phase).cos();
        let pitch_rate = 12.0 * 2.0 * TAU / period_s * (2.0 * TAU * phase).cos();

        let (r, p) = (roll.to_radians(), pitch.to_radians());
        let accel = [-p.sin(), r.sin() * p.cos(), r.cos() * p.cos()];

        let step = index % CYCLE;
        let twist = if (300..340).contains(&step) { 120.0 } else { 0.0 };
        let button_state = match step {
            100..=109 => BUTTON_SHORT,
            400..=424 => BUTTON_SHORT,
            425..=474 => BUTTON_LONG,
            _ => BUTTON_NONE,
        };

        SensorSample {
            accel,
            gyro: [roll_rate, pitch_rate, twist],
            button_state,
            timestamp: (index.wrapping_mul(SAMPLE_PERIOD.as_millis() as u64) & 0xFFFF) as u16,
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn scan(&mut self, _window: Duration) -> Result<Vec<Advertisement>, TransportError> {
        Ok(vec![Advertisement {
            device: DeviceHandle::new(SIMULATED_ID, SIMULATED_NAME),
            rssi: Some(-42),
        }])
    }

    async fn connect(&mut self, device: &DeviceHandle) -> Result<(), TransportError> {
        if device.id != SIMULATED_ID {
            return Err(TransportError::DeviceNotFound(device.id.clone()));
        }
        self.connected = true;
        self.delivered = 0;
        info!("Simulated peripheral connected");
        Ok(())
    }

    async fn subscribe(&mut self, _target: &GattTarget) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.streaming_since = Some(Instant::now());
        self.next_index = 0;
        Ok(())
    }

    fn poll_packet(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let Some(since) = self.streaming_since else {
            return Ok(None);
        };

        if let Some(limit) = self.drop_after {
            if self.delivered >= limit {
                debug!("Simulated link drop after {} packets", self.delivered);
                self.connected = false;
                self.streaming_since = None;
                return Err(TransportError::LinkLost);
            }
        }

        let elapsed = since.elapsed().as_millis() as u64;
        let due = elapsed / SAMPLE_PERIOD.as_millis() as u64 + 1;
        if self.next_index >= due {
            return Ok(None);
        }
        if due - self.next_index > MAX_BACKLOG {
            self.next_index = due - MAX_BACKLOG;
        }

        let packet = encode(&Self::sample(self.next_index));
        self.next_index += 1;
        self.delivered += 1;
        Ok(Some(Bytes::copy_from_slice(&packet)))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.streaming_since = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::packet::decode;

    async fn connected(drop_after: Option<u64>) -> SimulatedTransport {
        let mut transport = SimulatedTransport::new(drop_after);
        let ads = transport.scan(Duration::from_secs(1)).await.unwrap();
        transport.connect(&ads[0].device).await.unwrap();
        transport
            .subscribe(&GattTarget::from_config(&LinkConfig::default()))
            .await
            .unwrap();
        transport
    }

    fn drain(transport: &mut SimulatedTransport) -> Vec<Bytes> {
        let mut packets = Vec::new();
        while let Ok(Some(packet)) = transport.poll_packet() {
            packets.push(packet);
        }
        packets
    }

    #[tokio::test]
    async fn test_scan_finds_matching_device() {
        let mut transport = SimulatedTransport::new(None);
        let ads = transport.scan(Duration::from_secs(5)).await.unwrap();
        assert_eq!(ads.len(), 1);
        assert!(LinkConfig::default().matches_name(&ads[0].device.name));
    }

    #[tokio::test]
    async fn test_poll_before_connect_fails() {
        let mut transport = SimulatedTransport::new(None);
        assert!(matches!(transport.poll_packet(), Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_unknown_device_fails() {
        let mut transport = SimulatedTransport::new(None);
        let result = transport.connect(&DeviceHandle::new("00:00:00:00:00:00", "Other")).await;
        assert!(matches!(result, Err(TransportError::DeviceNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_packets_follow_sample_rate() {
        let mut transport = connected(None).await;
        assert_eq!(drain(&mut transport).len(), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut transport).len(), 5);

        assert!(transport.poll_packet().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_is_bounded() {
        let mut transport = connected(None).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(drain(&mut transport).len() as u64, MAX_BACKLOG);
    }

    #[tokio::test(start_paused = true)]
    async fn test_packets_decode() {
        let mut transport = connected(None).await;
        tokio::time::advance(Duration::from_millis(200)).await;
        let packets = drain(&mut transport);
        for (i, packet) in packets.iter().enumerate() {
            let sample = decode(packet).unwrap();
            assert_eq!(sample.timestamp, (i * 20) as u16);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_after_loses_link() {
        let mut transport = connected(Some(3)).await;
        tokio::time::advance(Duration::from_millis(200)).await;

        for _ in 0..3 {
            assert!(transport.poll_packet().unwrap().is_some());
        }
        assert!(matches!(transport.poll_packet(), Err(TransportError::LinkLost)));
        assert!(matches!(transport.poll_packet(), Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_script_has_click_and_long_press() {
        let codes: Vec<u8> = (0..CYCLE).map(|i| SimulatedTransport::sample(i).button_state).collect();
        assert_eq!(codes[100], BUTTON_SHORT);
        assert_eq!(codes[110], BUTTON_NONE);
        assert_eq!(codes[424], BUTTON_SHORT);
        assert_eq!(codes[425], BUTTON_LONG);
        assert_eq!(codes[475], BUTTON_NONE);
    }

    #[test]
    fn test_script_is_level_at_start() {
        let sample = SimulatedTransport::sample(0);
        assert!(sample.accel[0].abs() < 1e-6);
        assert!(sample.accel[1].abs() < 1e-6);
        assert!((sample.accel[2] - 1.0).abs() < 1e-6);
    }
}
