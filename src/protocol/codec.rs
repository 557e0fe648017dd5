//! Characteristic payload decoding.
//!
//! Decoders are pure functions over byte slices. [`CharacteristicCodec`]
//! routes a payload to the right decoder by characteristic UUID.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::ble::uuids::{BATTERY_LEVEL_UUID, HEART_RATE_MEASUREMENT_UUID};
use crate::data::DecodedValue;
use crate::error::{Error, Result};

/// Rendered by [`decode_generic`] for an empty payload.
pub const NO_DATA: &str = "no data";

/// CCCD value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCCD value disabling notifications and indications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Heart Rate Measurement flags: value format is UINT16.
const HR_FORMAT_UINT16: u8 = 0x01;

/// Decode a Heart Rate Measurement payload.
///
/// Bit 0 of the flags byte selects an 8-bit or a little-endian 16-bit
/// measurement starting at offset 1.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the payload is shorter than the
/// selected format requires.
pub fn decode_heart_rate(bytes: &[u8]) -> Result<u16> {
    let flags = *bytes.first().ok_or_else(|| Error::MalformedPayload {
        context: "heart rate payload is empty".to_string(),
    })?;

    if flags & HR_FORMAT_UINT16 != 0 {
        match bytes.get(1..3) {
            Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(Error::MalformedPayload {
                context: format!("heart rate UINT16 needs 3 bytes, got {}", bytes.len()),
            }),
        }
    } else {
        bytes
            .get(1)
            .map(|&bpm| u16::from(bpm))
            .ok_or_else(|| Error::MalformedPayload {
                context: format!("heart rate UINT8 needs 2 bytes, got {}", bytes.len()),
            })
    }
}

/// Decode a Battery Level payload.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] on an empty payload.
pub fn decode_battery_percent(bytes: &[u8]) -> Result<u8> {
    bytes.first().copied().ok_or_else(|| Error::MalformedPayload {
        context: "battery level payload is empty".to_string(),
    })
}

/// Render a payload as space-separated uppercase hex, e.g. `"0A FF"`.
///
/// An empty payload renders as [`NO_DATA`].
pub fn decode_generic(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return NO_DATA.to_string();
    }

    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The CCCD value that enables or disables notifications.
pub fn encode_notify_enable(enable: bool) -> [u8; 2] {
    if enable {
        ENABLE_NOTIFICATION_VALUE
    } else {
        DISABLE_NOTIFICATION_VALUE
    }
}

/// A typed decoder registered for one characteristic UUID.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<DecodedValue> + Send + Sync>;

/// UUID-keyed dispatch table of payload decoders.
///
/// Heart Rate Measurement and Battery Level are registered by default;
/// payloads of any other characteristic render through [`decode_generic`].
#[derive(Clone)]
pub struct CharacteristicCodec {
    decoders: HashMap<Uuid, Decoder>,
}

impl CharacteristicCodec {
    /// Create a codec with no typed decoders.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register (or replace) the decoder for a characteristic.
    pub fn register<F>(&mut self, uuid: Uuid, decoder: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<DecodedValue> + Send + Sync + 'static,
    {
        self.decoders.insert(uuid, Arc::new(decoder));
        self
    }

    /// Check if a typed decoder exists for `uuid`.
    pub fn has_decoder(&self, uuid: &Uuid) -> bool {
        self.decoders.contains_key(uuid)
    }

    /// Decode a payload from `uuid`.
    ///
    /// Never fails: a payload rejected by its typed decoder becomes
    /// [`DecodedValue::Unknown`] so the link keeps running.
    pub fn decode(&self, uuid: &Uuid, bytes: &[u8]) -> DecodedValue {
        match self.decoders.get(uuid) {
            Some(decoder) => decoder(bytes).unwrap_or_else(|e| {
                warn!("Failed to decode payload from {}: {}", uuid, e);
                DecodedValue::Unknown(bytes.to_vec())
            }),
            None => DecodedValue::RawHex(decode_generic(bytes)),
        }
    }
}

impl Default for CharacteristicCodec {
    fn default() -> Self {
        let mut codec = Self::empty();
        codec
            .register(HEART_RATE_MEASUREMENT_UUID, |b| {
                decode_heart_rate(b).map(DecodedValue::HeartRate)
            })
            .register(BATTERY_LEVEL_UUID, |b| {
                decode_battery_percent(b).map(DecodedValue::BatteryPercent)
            });
        codec
    }
}

impl std::fmt::Debug for CharacteristicCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacteristicCodec")
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}
