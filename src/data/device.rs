//! Discovered devices and raw scan results.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A BLE peripheral seen during scanning.
///
/// Identity is the hardware address: two `Device` values with the same
/// address compare equal even if one of them carries a name.
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    /// Stable hardware identifier, e.g. `"C4:7C:8D:6A:1B:2E"`.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl Device {
    /// Create a new device.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// The name to show to a user, falling back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// A single advertisement observed by the radio.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// The advertising device.
    pub device: Device,
    /// Raw advertisement payload. Opaque to this crate.
    pub advertisement: Bytes,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Service UUIDs listed in the advertisement.
    pub service_uuids: Vec<Uuid>,
    /// When the advertisement was received.
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    /// Create a scan result stamped with the current time.
    pub fn new(device: Device, advertisement: impl Into<Bytes>) -> Self {
        Self {
            device,
            advertisement: advertisement.into(),
            rssi: None,
            service_uuids: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the received signal strength.
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Attach the advertised service UUIDs.
    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.service_uuids = services;
        self
    }
}
