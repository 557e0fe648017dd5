//! GATT service tree produced by service discovery.

use uuid::Uuid;

/// Capability flags advertised by a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties {
    /// Supports read requests.
    pub readable: bool,
    /// Supports write requests (with or without response).
    pub writable: bool,
    /// Supports server-initiated notifications or indications.
    pub notifiable: bool,
}

impl CharacteristicProperties {
    /// Read-only characteristic.
    pub const READ: Self = Self {
        readable: true,
        writable: false,
        notifiable: false,
    };

    /// Notify-only characteristic.
    pub const NOTIFY: Self = Self {
        readable: false,
        writable: false,
        notifiable: true,
    };

    /// Readable and notifiable characteristic.
    pub const READ_NOTIFY: Self = Self {
        readable: true,
        writable: false,
        notifiable: true,
    };
}

/// A characteristic within a discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicDescriptor {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Supported operations.
    pub properties: CharacteristicProperties,
    /// Whether a Client Characteristic Configuration Descriptor is present.
    pub has_cccd: bool,
}

impl CharacteristicDescriptor {
    /// Create a new characteristic descriptor.
    pub fn new(uuid: Uuid, properties: CharacteristicProperties, has_cccd: bool) -> Self {
        Self {
            uuid,
            properties,
            has_cccd,
        }
    }
}

/// A discovered primary service and its characteristics, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDescriptor {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in the order the device reported them.
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    /// Create a new service descriptor.
    pub fn new(uuid: Uuid, characteristics: Vec<CharacteristicDescriptor>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Find a characteristic of this service by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// Find a characteristic anywhere in a service tree. The first match in
/// service order wins.
pub fn find_characteristic<'a>(
    services: &'a [ServiceDescriptor],
    uuid: &Uuid,
) -> Option<&'a CharacteristicDescriptor> {
    services.iter().find_map(|s| s.characteristic(uuid))
}
