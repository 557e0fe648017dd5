//! BLE Service, Characteristic and Descriptor UUIDs.
//!
//! Contains the well-known Bluetooth SIG UUIDs this crate understands, plus
//! the GATT status codes reported by the radio.

use uuid::Uuid;

/// Bluetooth SIG base UUID (`0000xxxx-0000-1000-8000-00805f9b34fb`).
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

// Heart Rate Service (Standard BLE)
/// Standard BLE Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID (Notify).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);

// Battery Service (Standard BLE)
/// Standard BLE Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic UUID (Read, Notify).
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);

// Descriptors
/// Client Characteristic Configuration Descriptor UUID.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

// GATT status codes
/// Operation completed successfully.
pub const GATT_SUCCESS: i32 = 0;
/// Generic stack error, reported when a link drops during setup.
pub const GATT_ERROR: i32 = 0x85;
/// Operation failed for an unspecified reason.
pub const GATT_FAILURE: i32 = 0x101;

/// Scan failed because of an internal radio error.
pub const SCAN_FAILED_INTERNAL_ERROR: i32 = 3;

/// Expand a 16-bit SIG-assigned number into a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Return the 16-bit assigned number if `uuid` is on the SIG base UUID.
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let mask = !(0xffff_ffffu128 << 96);
    if value & mask == BLUETOOTH_BASE_UUID && value >> 112 == 0 {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            HEART_RATE_MEASUREMENT_UUID.to_string(),
            "00002a37-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            BATTERY_SERVICE_UUID.to_string(),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            BATTERY_LEVEL_UUID.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_uuid_from_u16() {
        assert_eq!(uuid_from_u16(0x2a19), BATTERY_LEVEL_UUID);
        assert_eq!(uuid_from_u16(0x180d), HEART_RATE_SERVICE_UUID);
    }

    #[test]
    fn test_short_uuid() {
        assert_eq!(short_uuid(&HEART_RATE_MEASUREMENT_UUID), Some(0x2a37));
        assert_eq!(short_uuid(&CLIENT_CHARACTERISTIC_CONFIG_UUID), Some(0x2902));

        let vendor = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
        assert_eq!(short_uuid(&vendor), None);
    }
}
