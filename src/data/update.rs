//! Typed characteristic values delivered to consumers.

use std::fmt;
use uuid::Uuid;

/// A characteristic payload after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodedValue {
    /// Heart rate in beats per minute.
    HeartRate(u16),
    /// Battery level in percent.
    BatteryPercent(u8),
    /// Hex rendering of a payload without a typed decoder.
    RawHex(String),
    /// Payload that a typed decoder rejected.
    Unknown(Vec<u8>),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartRate(bpm) => write!(f, "{} bpm", bpm),
            Self::BatteryPercent(pct) => write!(f, "{} %", pct),
            Self::RawHex(hex) => write!(f, "{}", hex),
            Self::Unknown(bytes) => write!(f, "undecodable ({} bytes)", bytes.len()),
        }
    }
}

/// How a value reached the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateSource {
    /// Response to a read request.
    Read,
    /// Server-initiated notification.
    Notify,
}

/// One decoded characteristic value. Produced once per radio event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicUpdate {
    /// Characteristic the value came from.
    pub uuid: Uuid,
    /// Decoded value.
    pub value: DecodedValue,
    /// Whether it was read or notified.
    pub source: UpdateSource,
}
