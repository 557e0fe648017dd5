//! Radio transport seam.
//!
//! The core never calls a Bluetooth stack directly. Scanning goes through a
//! [`ScanBackend`], connections through a [`GattConnector`] which opens one
//! [`GattHandle`] per link. Backends report completions by delivering
//! [`LinkEvent`]s / [`ScanEvent`]s to the sink they were given.
//!
//! Backends must deliver events asynchronously. Delivering from inside a
//! request call (`open`, `submit`, `start_scan`) deadlocks the caller.

use uuid::Uuid;

use crate::ble::connection::EventSink;
use crate::ble::scanner::{ScanFilter, ScanSink};
use crate::ble::uuids::GATT_FAILURE;
use crate::data::{Device, ScanResult, ServiceDescriptor};
use crate::error::Result;

/// Inbound event from the radio for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The physical connection came up or went down.
    ConnectionChanged {
        /// `true` when connected.
        connected: bool,
        /// GATT status accompanying the change.
        status: i32,
    },
    /// Service discovery finished with a service tree or a status code.
    ServicesDiscovered(std::result::Result<Vec<ServiceDescriptor>, i32>),
    /// A read request completed.
    CharacteristicRead {
        /// Characteristic that was read.
        uuid: Uuid,
        /// GATT status.
        status: i32,
        /// Value read. Empty on failure.
        value: Vec<u8>,
    },
    /// The peripheral pushed a notification.
    CharacteristicChanged {
        /// Characteristic that changed.
        uuid: Uuid,
        /// New value.
        value: Vec<u8>,
    },
    /// A descriptor write completed.
    DescriptorWritten {
        /// Characteristic owning the descriptor.
        characteristic: Uuid,
        /// Descriptor that was written.
        descriptor: Uuid,
        /// GATT status.
        status: i32,
    },
}

/// Inbound event from the radio while scanning.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// An advertisement was received.
    Advertisement(ScanResult),
    /// The radio stopped scanning with a vendor error code.
    Failed {
        /// Vendor error code.
        code: i32,
    },
}

/// A GATT operation issued on an open handle. At most one is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattRequest {
    /// Discover all primary services.
    DiscoverServices,
    /// Read a characteristic value.
    Read {
        /// Characteristic to read.
        characteristic: Uuid,
    },
    /// Write a descriptor value.
    WriteDescriptor {
        /// Characteristic owning the descriptor.
        characteristic: Uuid,
        /// Descriptor to write.
        descriptor: Uuid,
        /// Value to write.
        value: [u8; 2],
    },
}

impl GattRequest {
    /// The completion event reporting that this request failed with `status`.
    pub fn failed(&self, status: i32) -> LinkEvent {
        match self {
            Self::DiscoverServices => LinkEvent::ServicesDiscovered(Err(status)),
            Self::Read { characteristic } => LinkEvent::CharacteristicRead {
                uuid: *characteristic,
                status,
                value: Vec::new(),
            },
            Self::WriteDescriptor {
                characteristic,
                descriptor,
                ..
            } => LinkEvent::DescriptorWritten {
                characteristic: *characteristic,
                descriptor: *descriptor,
                status,
            },
        }
    }

    /// The completion event used when the request could not be submitted.
    pub fn rejected(&self) -> LinkEvent {
        self.failed(GATT_FAILURE)
    }
}

/// Opens connections. One handle per [`GattLink`](crate::GattLink) session.
pub trait GattConnector: Send + Sync {
    /// Begin connecting to `device`. Returns immediately; the outcome
    /// arrives on `events` as [`LinkEvent::ConnectionChanged`].
    fn open(&self, device: &Device, events: EventSink) -> Result<Box<dyn GattHandle>>;
}

/// An open native connection.
pub trait GattHandle: Send {
    /// Issue a GATT request. The completion arrives on the link's sink.
    fn submit(&mut self, request: GattRequest) -> Result<()>;

    /// Disconnect and release the connection. Called exactly once.
    fn close(&mut self);
}

/// Drives advertisement discovery.
pub trait ScanBackend: Send + Sync {
    /// Start scanning. Advertisements and failures arrive on `events`.
    fn start_scan(&self, filter: Option<&ScanFilter>, events: ScanSink) -> Result<()>;

    /// Stop scanning. Must tolerate being called when no scan is running.
    fn stop_scan(&self);
}
