//! Permission gate consulted before any scan or connect request.
//!
//! Whether the application may use Bluetooth is decided outside this crate
//! (runtime permission prompts, user settings). The core only asks.

use std::fmt;

/// The kind of radio operation being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BluetoothOperation {
    /// Discovering nearby peripherals.
    Scan,
    /// Opening a GATT connection.
    Connect,
}

impl fmt::Display for BluetoothOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Connect => write!(f, "connect"),
        }
    }
}

/// Answers whether a Bluetooth operation is currently permitted.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionGate: Send + Sync {
    /// Returns `true` if `operation` may proceed.
    fn is_permitted(&self, operation: BluetoothOperation) -> bool;
}

/// A gate that permits everything. Used on desktop platforms where the OS
/// prompts on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn is_permitted(&self, _operation: BluetoothOperation) -> bool {
        true
    }
}

impl<F> PermissionGate for F
where
    F: Fn(BluetoothOperation) -> bool + Send + Sync,
{
    fn is_permitted(&self, operation: BluetoothOperation) -> bool {
        self(operation)
    }
}
