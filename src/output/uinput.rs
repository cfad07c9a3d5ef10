//! # uinput Virtual Mouse
//!
//! Registers a virtual relative pointer through `/dev/uinput` using evdev.
//!
//! ## Capabilities
//!
//! | Type | Codes |
//! |------|-------|
//! | EV_REL | REL_X, REL_Y, REL_WHEEL |
//! | EV_KEY | BTN_LEFT, BTN_RIGHT |
//!
//! Creating the device needs write access to `/dev/uinput` (root or a
//! udev rule granting the `input` group).

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, Key, RelativeAxisType};
use tracing::{debug, info};

use super::{OutputSink, PointerEvent};
use crate::config::OutputConfig;
use crate::error::{BridgeError, Result};
use crate::motion::buttons::MouseButton;

/// Device version reported in the input id
const DEVICE_VERSION: u16 = 0x0001;

/// Virtual mouse backed by a uinput device
pub struct UinputMouse {
    device: VirtualDevice,
    name: String,
}

impl std::fmt::Debug for UinputMouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputMouse")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl UinputMouse {
    /// Create the virtual mouse
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Output` if `/dev/uinput` cannot be opened or the
    /// device cannot be registered. The bridge cannot run without it.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_mouse_bridge::config::OutputConfig;
    /// use imu_mouse_bridge::output::uinput::UinputMouse;
    ///
    /// let mouse = UinputMouse::create(&OutputConfig::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(config: &OutputConfig) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);

        let id = InputId::new(
            BusType::BUS_USB,
            config.vendor_id,
            config.product_id,
            DEVICE_VERSION,
        );

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(&config.device_name).input_id(id).with_keys(&keys))
            .and_then(|builder| builder.with_relative_axes(&axes))
            .and_then(|builder| builder.build())
            .map_err(|e| BridgeError::Output(format!("Failed to create uinput device: {}", e)))?;

        info!(
            "Created virtual mouse '{}' ({:04x}:{:04x})",
            config.device_name, config.vendor_id, config.product_id
        );

        Ok(Self {
            device,
            name: config.device_name.clone(),
        })
    }
}

/// Translate pointer events to raw input events (without the SYN_REPORT)
fn to_input_events(events: &[PointerEvent]) -> Vec<InputEvent> {
    let mut raw = Vec::with_capacity(events.len() * 2);

    for event in events {
        match *event {
            PointerEvent::Move { dx, dy } => {
                if dx != 0 {
                    raw.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, dx));
                }
                if dy != 0 {
                    raw.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, dy));
                }
            }
            PointerEvent::Button { button, pressed } => {
                let key = match button {
                    MouseButton::Left => Key::BTN_LEFT,
                    MouseButton::Right => Key::BTN_RIGHT,
                };
                raw.push(InputEvent::new(EventType::KEY, key.code(), i32::from(pressed)));
            }
            PointerEvent::Wheel(notches) => {
                if notches != 0 {
                    raw.push(InputEvent::new(
                        EventType::RELATIVE,
                        RelativeAxisType::REL_WHEEL.0,
                        notches,
                    ));
                }
            }
        }
    }

    raw
}

impl OutputSink for UinputMouse {
    fn emit(&mut self, events: &[PointerEvent]) -> Result<()> {
        let raw = to_input_events(events);
        if raw.is_empty() {
            return Ok(());
        }

        // evdev appends the SYN_REPORT for the batch
        self.device
            .emit(&raw)
            .map_err(|e| BridgeError::Output(format!("Failed to write input events: {}", e)))?;

        debug!("Emitted {} input events", raw.len());
        Ok(())
    }
}
