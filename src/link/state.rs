//! Link lifecycle states

use std::fmt;

/// A discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Transport specific identifier (BLE: the peripheral address)
    pub id: String,
    /// Advertised name
    pub name: String,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Connection lifecycle state
///
/// ```text
/// Idle -> Scanning -> Found -> Connecting -> Streaming -> Disconnecting
///   ^        |                    |                           |
///   |        v                    v                           v
///   +---- Retrying <--------------+---------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Scanning,
    Found(DeviceHandle),
    Connecting,
    Streaming,
    Disconnecting,
    Retrying,
}

impl LinkState {
    /// State name without payload, for logs
    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Idle => "Idle",
            LinkState::Scanning => "Scanning",
            LinkState::Found(_) => "Found",
            LinkState::Connecting => "Connecting",
            LinkState::Streaming => "Streaming",
            LinkState::Disconnecting => "Disconnecting",
            LinkState::Retrying => "Retrying",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Found(device) => write!(f, "Found({})", device),
            other => f.write_str(other.name()),
        }
    }
}
