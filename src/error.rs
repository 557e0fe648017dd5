//! Error types for the gatt-session crate.

use thiserror::Error;
use uuid::Uuid;

use crate::ble::connection::ConnectionState;
use crate::permission::BluetoothOperation;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The permission gate refused the operation.
    #[error("Bluetooth permission denied for {operation}")]
    PermissionDenied {
        /// The operation that was refused.
        operation: BluetoothOperation,
    },

    /// A scan is already running on this session.
    #[error("Already scanning")]
    AlreadyScanning,

    /// The radio reported a scan failure. The session is stopped.
    #[error("Scan failed with code {code}")]
    ScanError {
        /// Vendor error code reported by the radio.
        code: i32,
    },

    /// A connection attempt is already in progress.
    #[error("Connection already in progress")]
    AlreadyConnecting,

    /// The link already holds a connection.
    #[error("Already connected")]
    AlreadyConnected,

    /// The radio could not establish the connection.
    #[error("Connection failed with status {code}")]
    ConnectFailed {
        /// GATT status code reported by the radio.
        code: i32,
    },

    /// Service discovery failed; the link was torn down.
    #[error("Service discovery failed with status {code}")]
    DiscoveryFailed {
        /// GATT status code reported by the radio.
        code: i32,
    },

    /// The operation requires a link in the `Ready` state.
    #[error("Link not ready (state: {state})")]
    NotReady {
        /// The state the link was in.
        state: ConnectionState,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: Uuid,
    },

    /// The characteristic has no Client Characteristic Configuration Descriptor.
    #[error("Client configuration descriptor not found on characteristic {uuid}")]
    DescriptorNotFound {
        /// The UUID of the characteristic lacking the descriptor.
        uuid: Uuid,
    },

    /// The characteristic does not advertise the requested capability.
    #[error("Characteristic {uuid} does not support {operation}")]
    OperationNotSupported {
        /// The UUID of the characteristic.
        uuid: Uuid,
        /// The capability that was requested.
        operation: &'static str,
    },

    /// A characteristic read completed with an error status.
    #[error("Read of {uuid} failed with status {code}")]
    ReadFailed {
        /// The UUID of the characteristic.
        uuid: Uuid,
        /// GATT status code reported by the radio.
        code: i32,
    },

    /// A descriptor write completed with an error status.
    #[error("Descriptor write on {uuid} failed with status {code}")]
    DescriptorWriteFailed {
        /// The UUID of the characteristic owning the descriptor.
        uuid: Uuid,
        /// GATT status code reported by the radio.
        code: i32,
    },

    /// A payload was too short or otherwise undecodable.
    #[error("Malformed payload: {context}")]
    MalformedPayload {
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// Updates were discarded because the channel was full.
    #[error("Update channel overflow: {dropped} update(s) dropped")]
    ChannelOverflow {
        /// Number of updates lost since the last report.
        dropped: u64,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
