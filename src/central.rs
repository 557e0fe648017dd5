//! Entry point wiring sessions to the system Bluetooth adapter.

use btleplug::api::{Central, Manager as _};
use btleplug::platform::{Adapter, Manager};
use std::sync::Arc;
use tracing::info;

use crate::ble::connection::{GattLink, LinkConfig, LinkUpdate};
use crate::ble::platform::{BtleplugConnector, BtleplugScanner};
use crate::ble::scanner::ScanSession;
use crate::channel::UpdateReceiver;
use crate::error::{Error, Result};
use crate::permission::{AllowAll, PermissionGate};
use crate::protocol::codec::CharacteristicCodec;

/// Hands out scan sessions and GATT links backed by one Bluetooth adapter.
///
/// ```rust,no_run
/// use gatt_session::{BleCentral, LinkConfig, Result};
///
/// # async fn run() -> Result<()> {
/// let central = BleCentral::new().await?;
/// let scan = central.scan_session();
/// scan.start(None)?;
///
/// let (link, updates) = central.gatt_link(LinkConfig::default());
/// # Ok(())
/// # }
/// ```
pub struct BleCentral {
    adapter: Adapter,
    gate: Arc<dyn PermissionGate>,
}

impl BleCentral {
    /// Use the first Bluetooth adapter on this system.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter. Every operation is permitted until a gate
    /// is installed with [`with_permission_gate`](Self::with_permission_gate).
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            gate: Arc::new(AllowAll),
        }
    }

    /// Consult `gate` before every scan start and connect.
    pub fn with_permission_gate(mut self, gate: impl PermissionGate + 'static) -> Self {
        self.gate = Arc::new(gate);
        self
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Create a new, idle scan session.
    pub fn scan_session(&self) -> ScanSession {
        ScanSession::new(
            Arc::new(BtleplugScanner::new(self.adapter.clone())),
            self.gate.clone(),
        )
    }

    /// Create a new, disconnected GATT link and its update receiver.
    pub fn gatt_link(&self, config: LinkConfig) -> (GattLink, UpdateReceiver<LinkUpdate>) {
        self.gatt_link_with_codec(config, CharacteristicCodec::default())
    }

    /// Like [`gatt_link`](Self::gatt_link) with a custom codec.
    pub fn gatt_link_with_codec(
        &self,
        config: LinkConfig,
        codec: CharacteristicCodec,
    ) -> (GattLink, UpdateReceiver<LinkUpdate>) {
        GattLink::with_codec(
            Arc::new(BtleplugConnector::new(self.adapter.clone())),
            self.gate.clone(),
            config,
            codec,
        )
    }
}

impl std::fmt::Debug for BleCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleCentral").finish_non_exhaustive()
    }
}
