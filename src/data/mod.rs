//! Data structures shared across the crate.
//!
//! Discovered devices, the GATT service tree and decoded characteristic
//! updates.

pub mod device;
pub mod gatt;
pub mod update;

pub use device::{Device, ScanResult};
pub use gatt::{
    find_characteristic, CharacteristicDescriptor, CharacteristicProperties, ServiceDescriptor,
};
pub use update::{CharacteristicUpdate, DecodedValue, UpdateSource};
