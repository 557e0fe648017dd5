//! BLE communication module.
//!
//! Scanning and connection management, the radio seams they drive, and the
//! btleplug implementation of those seams.

pub mod connection;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use connection::{ConnectionState, EventSink, GattLink, LinkConfig, LinkUpdate};
pub use platform::{BtleplugConnector, BtleplugScanner};
pub use scanner::{ScanFilter, ScanSession, ScanSink};
pub use transport::{GattConnector, GattHandle, GattRequest, LinkEvent, ScanBackend, ScanEvent};
pub use uuids::*;
