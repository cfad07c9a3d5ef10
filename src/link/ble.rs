//! # BLE Transport
//!
//! Bluetooth Low Energy link using `btleplug` (BlueZ on Linux).
//!
//! Notifications arrive on a stream owned by a forwarding task, which copies
//! them into a bounded channel. [`Transport::poll_packet`] drains that channel
//! without blocking. When the peripheral disconnects the task exits, the
//! channel closes, and the next poll reports `LinkLost`.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::DeviceHandle;
use super::transport::{Advertisement, GattTarget, Transport, TransportError};

/// Notifications buffered between polls (about 1.3 s at 50 Hz)
const NOTIFICATION_BUFFER: usize = 64;

/// BLE central talking to one peripheral at a time
#[derive(Default)]
pub struct BleTransport {
    adapter: Option<Adapter>,
    /// Peripherals seen by the last scan, keyed by address
    seen: HashMap<String, Peripheral>,
    peripheral: Option<Peripheral>,
    packets: Option<mpsc::Receiver<Bytes>>,
    forwarder: Option<JoinHandle<()>>,
}

impl BleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// First adapter on the system, opened on first use
    async fn adapter(&mut self) -> Result<Adapter, TransportError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Adapter("No Bluetooth adapter found".to_string()))?;

        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn stop_forwarder(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        self.packets = None;
    }
}

fn uuid_matches(uuid: impl Display, expected: &str) -> bool {
    uuid.to_string().eq_ignore_ascii_case(expected)
}

#[async_trait]
impl Transport for BleTransport {
    async fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>, TransportError> {
        let adapter = self.adapter().await?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Scan(e.to_string()))?;
        tokio::time::sleep(window).await;

        let peripherals = adapter.peripherals().await;
        if let Err(e) = adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }
        let peripherals = peripherals.map_err(|e| TransportError::Scan(e.to_string()))?;

        self.seen.clear();
        let mut advertisements = Vec::new();
        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            let Some(name) = props.local_name else {
                continue;
            };
            let id = peripheral.address().to_string();
            debug!("Saw {} ({}) rssi {:?}", name, id, props.rssi);

            advertisements.push(Advertisement {
                device: DeviceHandle::new(id.clone(), name),
                rssi: props.rssi,
            });
            self.seen.insert(id, peripheral);
        }

        Ok(advertisements)
    }

    async fn connect(&mut self, device: &DeviceHandle) -> Result<(), TransportError> {
        let peripheral = self
            .seen
            .get(&device.id)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotFound(device.id.clone()))?;

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        self.peripheral = Some(peripheral);
        Ok(())
    }

    async fn subscribe(&mut self, target: &GattTarget) -> Result<(), TransportError> {
        let peripheral = self.peripheral.clone().ok_or(TransportError::NotConnected)?;
        let adapter = self.adapter().await?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                uuid_matches(c.service_uuid, &target.service_uuid)
                    && uuid_matches(c.uuid, &target.characteristic_uuid)
            })
            .ok_or_else(|| TransportError::CharacteristicNotFound(target.characteristic_uuid.clone()))?;

        // Open both streams before subscribing so nothing is missed
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        let mut events = adapter
            .events()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        self.stop_forwarder();
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let peripheral_id = peripheral.id();
        let characteristic_uuid = characteristic.uuid;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(n) if n.uuid == characteristic_uuid => {
                            if tx.try_send(Bytes::from(n.value)).is_err() {
                                debug!("Notification buffer full, dropping packet");
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            warn!("Peripheral disconnected");
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        });

        self.packets = Some(rx);
        self.forwarder = Some(task);
        info!("Subscribed to characteristic {}", target.characteristic_uuid);
        Ok(())
    }

    fn poll_packet(&mut self) -> Result<Option<Bytes>, TransportError> {
        let packets = self.packets.as_mut().ok_or(TransportError::NotConnected)?;
        match packets.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.packets = None;
                Err(TransportError::LinkLost)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop_forwarder();
        if let Some(peripheral) = self.peripheral.take() {
            if peripheral.is_connected().await.unwrap_or(false) {
                peripheral
                    .disconnect()
                    .await
                    .map_err(|e| TransportError::Connect(e.to_string()))?;
            }
        }
        Ok(())
    }
}
