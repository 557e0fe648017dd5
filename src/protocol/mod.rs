//! Protocol module for characteristic payloads.
//!
//! Decoders for the standard Heart Rate and Battery characteristics, a hex
//! fallback for everything else, and the CCCD values written to toggle
//! notifications.

pub mod codec;

pub use codec::{CharacteristicCodec, Decoder};
