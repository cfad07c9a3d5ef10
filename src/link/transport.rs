//! Trait abstraction for the packet link to enable testing
//!
//! The state machine pulls packets; push-style notifications are buffered
//! inside each implementation until [`Transport::poll_packet`] drains them.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

use super::state::DeviceHandle;
use crate::config::LinkConfig;

/// One advertisement seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub device: DeviceHandle,
    /// Signal strength in dBm, when the transport reports it
    pub rssi: Option<i16>,
}

/// Service and characteristic carrying sensor notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattTarget {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

impl GattTarget {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            service_uuid: config.service_uuid.clone(),
            characteristic_uuid: config.characteristic_uuid.clone(),
        }
    }
}

/// Link-layer failures. All of them are recovered by retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Adapter unavailable: {0}")]
    Adapter(String),

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Link lost")]
    LinkLost,
}

/// Packet source driven by the link state machine
#[async_trait]
pub trait Transport: Send {
    /// Listen for advertisements for up to `window`
    async fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, TransportError>;

    /// Open a connection to a scanned device
    async fn connect(&mut self, device: &DeviceHandle) -> Result<(), TransportError>;

    /// Enable notifications on the sensor characteristic
    async fn subscribe(&mut self, target: &GattTarget) -> Result<(), TransportError>;

    /// Next buffered packet without waiting
    ///
    /// `Ok(None)` means nothing is pending. `Err(LinkLost)` means the link
    /// dropped and the buffer is drained.
    fn poll_packet(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Close the connection. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, TransportError> {
        (**self).scan(window).await
    }

    async fn connect(&mut self, device: &DeviceHandle) -> Result<(), TransportError> {
        (**self).connect(device).await
    }

    async fn subscribe(&mut self, target: &GattTarget) -> Result<(), TransportError> {
        (**self).subscribe(target).await
    }

    fn poll_packet(&mut self) -> Result<Option<Bytes>, TransportError> {
        (**self).poll_packet()
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }
}
