// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # gatt-session
//!
//! A BLE central session manager: discover nearby peripherals, hold one
//! GATT connection per link, and receive decoded characteristic updates on
//! an asynchronous channel.
//!
//! ## Features
//!
//! - **Scanning**: Restartable scan sessions with optional name/service
//!   filtering and per-address deduplication
//! - **Connection Lifecycle**: Connect, service discovery and teardown
//!   driven by an explicit state machine
//! - **Serialized GATT Operations**: Reads and notification toggles are
//!   queued and issued one at a time
//! - **Decoding**: Heart Rate and Battery Level out of the box, hex for
//!   everything else, custom decoders per characteristic
//! - **Backpressure**: Bounded update channels that drop with a counted loss
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use gatt_session::{BleCentral, LinkConfig, Result, BATTERY_LEVEL_UUID};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let central = BleCentral::new().await?;
//!
//!     // Take the first device we hear from
//!     let scan = central.scan_session();
//!     scan.start(None)?;
//!     let mut devices = Box::pin(scan.devices());
//!     let device = match devices.next().await {
//!         Some(device) => device?,
//!         None => return Ok(()),
//!     };
//!     drop(devices);
//!     scan.stop();
//!
//!     // Connect and subscribe to battery level once services are known
//!     let (link, mut updates) =
//!         central.gatt_link(LinkConfig::default().notify_on_ready(BATTERY_LEVEL_UUID));
//!     link.connect(device)?;
//!
//!     while let Some(update) = updates.recv().await {
//!         println!("{:?}", update?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data and config types

// Public modules
pub mod ble;
pub mod central;
pub mod channel;
pub mod data;
pub mod error;
pub mod permission;
pub mod protocol;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use central::BleCentral;
pub use channel::{
    update_channel, ChannelConfig, OverflowPolicy, SendStatus, UpdateReceiver, UpdateSender,
};
pub use error::{Error, Result};
pub use permission::{AllowAll, BluetoothOperation, PermissionGate};

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionState, GattLink, LinkConfig, LinkUpdate};
pub use ble::scanner::{ScanFilter, ScanSession};
pub use ble::uuids::{
    BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID, CLIENT_CHARACTERISTIC_CONFIG_UUID,
    HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID,
};
pub use data::{
    CharacteristicDescriptor, CharacteristicProperties, CharacteristicUpdate, DecodedValue,
    Device, ScanResult, ServiceDescriptor, UpdateSource,
};
pub use protocol::CharacteristicCodec;
