//! BLE scanning functionality.
//!
//! [`ScanSession`] turns a stream of raw advertisements into a deduplicated
//! sequence of [`Device`]s. The first advertisement from an address wins;
//! later ones from the same address are dropped.
//!
//! The discovered list is the single source for every device stream. Each
//! stream keeps a cursor into it and is woken through a `watch` counter, so
//! a slow consumer never misses a device.

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::ble::transport::{ScanBackend, ScanEvent};
use crate::data::{Device, ScanResult};
use crate::error::{Error, Result};
use crate::permission::{BluetoothOperation, PermissionGate};

/// Optional advertisement filter. All set criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanFilter {
    /// Case-insensitive substring of the advertised name.
    pub name_contains: Option<String>,
    /// Service UUID that must be advertised.
    pub service_uuid: Option<Uuid>,
}

impl ScanFilter {
    /// Match devices whose name contains `needle`.
    pub fn name(needle: impl Into<String>) -> Self {
        Self {
            name_contains: Some(needle.into()),
            service_uuid: None,
        }
    }

    /// Match devices advertising `uuid`.
    pub fn service(uuid: Uuid) -> Self {
        Self {
            name_contains: None,
            service_uuid: Some(uuid),
        }
    }

    /// Check if a scan result passes this filter.
    pub fn matches(&self, result: &ScanResult) -> bool {
        let name_ok = match &self.name_contains {
            Some(needle) => result
                .device
                .name
                .as_ref()
                .map(|n| n.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            None => true,
        };

        let service_ok = match &self.service_uuid {
            Some(uuid) => result.service_uuids.contains(uuid),
            None => true,
        };

        name_ok && service_ok
    }
}

struct ScanCore {
    scanning: bool,
    /// Bumped on start, stop and failure; tags sinks.
    generation: u64,
    /// Bumped on start only; tags device streams.
    scan_id: u64,
    filter: Option<ScanFilter>,
    seen: HashSet<String>,
    devices: Vec<Device>,
    last_failure: Option<i32>,
    changes: watch::Sender<u64>,
}

impl ScanCore {
    /// Wake every device stream.
    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn handle_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Advertisement(result) => {
                if let Some(filter) = &self.filter {
                    if !filter.matches(&result) {
                        trace!("Filtered out advertisement from {}", result.device.address);
                        return;
                    }
                }

                if !self.seen.insert(result.device.address.clone()) {
                    trace!("Dropping repeat advertisement from {}", result.device.address);
                    return;
                }

                debug!("Discovered {} (RSSI {:?})", result.device, result.rssi);
                self.devices.push(result.device);
                self.notify_changed();
            }
            ScanEvent::Failed { code } => {
                error!("Scan failed with code {}", code);
                self.scanning = false;
                self.generation += 1;
                self.last_failure = Some(code);
                self.notify_changed();
            }
        }
    }
}

/// Entry point for radio scan callbacks into a [`ScanSession`].
#[derive(Clone)]
pub struct ScanSink {
    core: Weak<Mutex<ScanCore>>,
    generation: u64,
}

impl ScanSink {
    /// Deliver a scan event. Safe to call from any thread.
    pub fn deliver(&self, event: ScanEvent) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let mut core = core.lock();
        if !core.scanning || core.generation != self.generation {
            trace!("Discarding event from a finished scan");
            return;
        }

        core.handle_event(event);
    }
}

impl std::fmt::Debug for ScanSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// A restartable device discovery session.
pub struct ScanSession {
    core: Arc<Mutex<ScanCore>>,
    backend: Arc<dyn ScanBackend>,
    gate: Arc<dyn PermissionGate>,
}

impl ScanSession {
    /// Create a new scan session over a radio backend.
    pub fn new(backend: Arc<dyn ScanBackend>, gate: Arc<dyn PermissionGate>) -> Self {
        let (changes, _) = watch::channel(0);

        Self {
            core: Arc::new(Mutex::new(ScanCore {
                scanning: false,
                generation: 0,
                scan_id: 0,
                filter: None,
                seen: HashSet::new(),
                devices: Vec::new(),
                last_failure: None,
                changes,
            })),
            backend,
            gate,
        }
    }

    /// Start scanning.
    ///
    /// Each scan starts with an empty device set.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] if the gate refuses, [`Error::AlreadyScanning`]
    /// if a scan is running, or the backend's error if the radio cannot start.
    pub fn start(&self, filter: Option<ScanFilter>) -> Result<()> {
        if !self.gate.is_permitted(BluetoothOperation::Scan) {
            return Err(Error::PermissionDenied {
                operation: BluetoothOperation::Scan,
            });
        }

        let mut core = self.core.lock();
        if core.scanning {
            return Err(Error::AlreadyScanning);
        }

        info!("Starting BLE scan (filter: {:?})", filter);

        core.generation += 1;
        let sink = ScanSink {
            core: Arc::downgrade(&self.core),
            generation: core.generation,
        };

        self.backend.start_scan(filter.as_ref(), sink)?;

        core.scanning = true;
        core.scan_id += 1;
        core.filter = filter;
        core.seen.clear();
        core.devices.clear();
        core.last_failure = None;
        core.notify_changed();

        Ok(())
    }

    /// Stop scanning. A no-op when not scanning.
    pub fn stop(&self) {
        let mut core = self.core.lock();
        if !core.scanning {
            debug!("Not scanning, ignoring stop request");
            return;
        }

        info!("Stopping BLE scan");

        core.scanning = false;
        core.generation += 1;
        self.backend.stop_scan();
        core.notify_changed();
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.core.lock().scanning
    }

    /// Devices discovered by the current (or last) scan.
    ///
    /// Yields the devices seen so far in first-seen order, then new devices
    /// as they are discovered. Ends when the scan stops, or early if the
    /// session is restarted. A radio failure is yielded as a final
    /// `Err(Error::ScanError)`.
    pub fn devices(&self) -> impl Stream<Item = Result<Device>> {
        let cursor = {
            let core = self.core.lock();
            DeviceCursor {
                core: self.core.clone(),
                scan_id: core.scan_id,
                next: 0,
                changes: core.changes.subscribe(),
                finished: false,
            }
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                match cursor.step() {
                    Step::Item(item) => return Some((item, cursor)),
                    Step::End => return None,
                    Step::Wait => {
                        if cursor.changes.changed().await.is_err() {
                            return None;
                        }
                    }
                }
            }
        })
    }
}

/// Position of one device stream in the discovered list.
struct DeviceCursor {
    core: Arc<Mutex<ScanCore>>,
    scan_id: u64,
    next: usize,
    changes: watch::Receiver<u64>,
    finished: bool,
}

enum Step {
    Item(Result<Device>),
    Wait,
    End,
}

impl DeviceCursor {
    fn step(&mut self) -> Step {
        if self.finished {
            return Step::End;
        }

        let core = self.core.lock();
        // Mark seen under the core lock; every change is published under it.
        let _ = self.changes.borrow_and_update();

        if core.scan_id != self.scan_id {
            self.finished = true;
            return Step::End;
        }

        if let Some(device) = core.devices.get(self.next) {
            self.next += 1;
            return Step::Item(Ok(device.clone()));
        }

        if core.scanning {
            return Step::Wait;
        }

        self.finished = true;
        match core.last_failure {
            Some(code) => Step::Item(Err(Error::ScanError { code })),
            None => Step::End,
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}
