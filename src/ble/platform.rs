//! btleplug-backed radio.
//!
//! Adapts btleplug's async API to the callback-style [`ScanBackend`] and
//! [`GattConnector`] seams. Each connection is driven by one task that
//! executes GATT requests in order and reports completions as
//! [`LinkEvent`]s. Must be used from within a Tokio runtime.

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Peripheral as _, PeripheralProperties,
    ScanFilter as PlatformScanFilter,
};
use btleplug::platform::{Adapter, Peripheral};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::connection::EventSink;
use crate::ble::scanner::{ScanFilter, ScanSink};
use crate::ble::transport::{
    GattConnector, GattHandle, GattRequest, LinkEvent, ScanBackend, ScanEvent,
};
use crate::ble::uuids::*;
use crate::data::{
    CharacteristicDescriptor, CharacteristicProperties, Device, ScanResult, ServiceDescriptor,
};
use crate::error::{Error, Result};
use crate::protocol::codec::DISABLE_NOTIFICATION_VALUE;

// Advertising data types (Bluetooth Core Supplement, Part A)
const AD_INCOMPLETE_16BIT_SERVICES: u8 = 0x02;
const AD_INCOMPLETE_128BIT_SERVICES: u8 = 0x06;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

fn runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| Error::Internal(format!("no Tokio runtime: {}", e)))
}

/// Background tasks that must reach the radio strictly in order.
///
/// Each task spawned through the chain is handed the previous task's handle
/// and decides whether to abort it, await it, or both.
#[derive(Default)]
struct TaskChain {
    last: Mutex<Option<JoinHandle<()>>>,
}

impl TaskChain {
    fn spawn<F, Fut>(&self, runtime: &Handle, task: F)
    where
        F: FnOnce(Option<JoinHandle<()>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut last = self.last.lock();
        let previous = last.take();
        *last = Some(runtime.spawn(task(previous)));
    }
}

/// Scanner over a btleplug adapter.
pub struct BtleplugScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Scan and stop tasks. A restart waits for the preceding stop.
    tasks: TaskChain,
}

impl BtleplugScanner {
    /// Create a scanner on `adapter`.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            tasks: TaskChain::default(),
        }
    }

    /// Handle a BLE central event.
    async fn handle_event(event: CentralEvent, adapter: &Adapter, sink: &ScanSink) {
        let id = match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ManufacturerDataAdvertisement { id, .. }
            | CentralEvent::ServiceDataAdvertisement { id, .. }
            | CentralEvent::ServicesAdvertisement { id, .. } => id,
            _ => return,
        };

        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        sink.deliver(ScanEvent::Advertisement(scan_result(&properties)));
    }
}

/// Feed adapter events to `handle` until the stream ends, then fail the scan.
///
/// A scan is only stopped by aborting this loop, so running out of events
/// means the adapter went away.
async fn drive_scan<S, F, Fut>(mut central_events: S, sink: &ScanSink, mut handle: F)
where
    S: Stream<Item = CentralEvent> + Unpin,
    F: FnMut(CentralEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(event) = central_events.next().await {
        handle(event).await;
    }

    error!("Adapter event stream ended during scan");
    sink.deliver(ScanEvent::Failed {
        code: SCAN_FAILED_INTERNAL_ERROR,
    });
}

impl ScanBackend for BtleplugScanner {
    fn start_scan(&self, filter: Option<&ScanFilter>, events: ScanSink) -> Result<()> {
        let runtime = runtime()?;

        // Only the service UUID can be pushed down to the radio.
        let platform_filter = PlatformScanFilter {
            services: filter
                .and_then(|f| f.service_uuid)
                .into_iter()
                .collect(),
        };

        let adapter = self.adapter.clone();
        self.tasks.spawn(&runtime, |previous| async move {
            if let Some(stop) = previous {
                let _ = stop.await;
            }

            let central_events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    events.deliver(ScanEvent::Failed {
                        code: SCAN_FAILED_INTERNAL_ERROR,
                    });
                    return;
                }
            };

            if let Err(e) = adapter.start_scan(platform_filter).await {
                error!("Failed to start scan: {}", e);
                events.deliver(ScanEvent::Failed {
                    code: SCAN_FAILED_INTERNAL_ERROR,
                });
                return;
            }

            drive_scan(central_events, &events, |event| {
                Self::handle_event(event, &adapter, &events)
            })
            .await;
        });

        Ok(())
    }

    fn stop_scan(&self) {
        let Ok(runtime) = runtime() else {
            warn!("No runtime to stop the scan on");
            return;
        };

        let adapter = self.adapter.clone();
        self.tasks.spawn(&runtime, |previous| {
            if let Some(scan) = &previous {
                scan.abort();
            }

            async move {
                if let Some(scan) = previous {
                    let _ = scan.await;
                }
                if let Err(e) = adapter.stop_scan().await {
                    warn!("Failed to stop scan: {}", e);
                }
                debug!("Scan stopped");
            }
        });
    }
}

/// Build a [`ScanResult`] from btleplug's cached peripheral properties.
fn scan_result(properties: &PeripheralProperties) -> ScanResult {
    let device = Device::new(properties.address.to_string(), properties.local_name.clone());

    let mut result = ScanResult::new(device, encode_advertisement(properties))
        .with_services(properties.services.clone());
    result.rssi = properties.rssi;
    result
}

/// Re-encode the advertised fields btleplug exposes as AD structures.
///
/// btleplug does not hand out the raw PDU, so this is a reconstruction:
/// local name, service UUID lists and manufacturer data, in that order.
fn encode_advertisement(properties: &PeripheralProperties) -> Bytes {
    let mut buf = BytesMut::new();

    let mut put_structure = |ad_type: u8, payload: &[u8]| {
        // Length covers the type byte; longer fields cannot be represented.
        if payload.len() < u8::MAX as usize {
            buf.put_u8(payload.len() as u8 + 1);
            buf.put_u8(ad_type);
            buf.put_slice(payload);
        }
    };

    if let Some(name) = &properties.local_name {
        put_structure(AD_COMPLETE_LOCAL_NAME, name.as_bytes());
    }

    let (short, long): (Vec<&Uuid>, Vec<&Uuid>) = properties
        .services
        .iter()
        .partition(|u| short_uuid(u).is_some());

    if !short.is_empty() {
        let payload: Vec<u8> = short
            .iter()
            .filter_map(|u| short_uuid(u))
            .flat_map(u16::to_le_bytes)
            .collect();
        put_structure(AD_INCOMPLETE_16BIT_SERVICES, &payload);
    }

    if !long.is_empty() {
        let payload: Vec<u8> = long
            .iter()
            .flat_map(|u| {
                let mut bytes = *u.as_bytes();
                bytes.reverse();
                bytes
            })
            .collect();
        put_structure(AD_INCOMPLETE_128BIT_SERVICES, &payload);
    }

    let mut manufacturers: Vec<_> = properties.manufacturer_data.iter().collect();
    manufacturers.sort_by_key(|(id, _)| **id);
    for (company, data) in manufacturers {
        let mut payload = company.to_le_bytes().to_vec();
        payload.extend_from_slice(data);
        put_structure(AD_MANUFACTURER_DATA, &payload);
    }

    buf.freeze()
}

/// Opens connections through a btleplug adapter.
pub struct BtleplugConnector {
    adapter: Adapter,
    /// A connection's driver starts only once the previous one has
    /// disconnected.
    drivers: TaskChain,
}

impl BtleplugConnector {
    /// Create a connector on `adapter`.
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            drivers: TaskChain::default(),
        }
    }
}

impl GattConnector for BtleplugConnector {
    fn open(&self, device: &Device, events: EventSink) -> Result<Box<dyn GattHandle>> {
        let runtime = runtime()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = ConnectionDriver {
            adapter: self.adapter.clone(),
            address: device.address.clone(),
            commands: command_rx,
            events,
        };
        self.drivers.spawn(&runtime, |previous| driver.run(previous));

        Ok(Box::new(BtleplugHandle {
            commands: command_tx,
        }))
    }
}

#[derive(Debug)]
enum Command {
    Request(GattRequest),
    Close,
}

struct BtleplugHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl GattHandle for BtleplugHandle {
    fn submit(&mut self, request: GattRequest) -> Result<()> {
        self.commands
            .send(Command::Request(request))
            .map_err(|_| Error::Internal("connection task has stopped".to_string()))
    }

    fn close(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}

/// Drive `future` until it completes or the handle is closed.
///
/// Returns `None` if closed first. No request is valid before the connection
/// is up; any that arrive are failed so the link's queue keeps moving.
async fn until_closed<F: Future>(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &EventSink,
    future: F,
) -> Option<F::Output> {
    tokio::pin!(future);

    loop {
        tokio::select! {
            biased;

            output = &mut future => return Some(output),
            command = commands.recv() => match command {
                Some(Command::Request(request)) => events.deliver(request.rejected()),
                Some(Command::Close) | None => return None,
            },
        }
    }
}

/// Unwrap one step of connection setup, reporting a failed connect on error.
fn setup_step<T>(
    result: btleplug::Result<T>,
    step: &str,
    address: &str,
    events: &EventSink,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to {} for {}: {}", step, address, e);
            events.deliver(LinkEvent::ConnectionChanged {
                connected: false,
                status: GATT_ERROR,
            });
            None
        }
    }
}

async fn disconnect(peripheral: &Peripheral, address: &str) {
    debug!("Closing connection to {}", address);
    if let Err(e) = peripheral.disconnect().await {
        debug!("Failed to disconnect from {}: {}", address, e);
    }
}

/// Owns one btleplug peripheral for the lifetime of a connection.
struct ConnectionDriver {
    adapter: Adapter,
    address: String,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventSink,
}

impl ConnectionDriver {
    async fn run(mut self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            let released = async {
                let _ = previous.await;
            };
            if until_closed(&mut self.commands, &self.events, released)
                .await
                .is_none()
            {
                debug!("Connection to {} closed before it started", self.address);
                return;
            }
        }

        let Some(peripheral) = self.find_peripheral().await else {
            warn!("Peripheral {} not known to the adapter", self.address);
            self.report_disconnected(GATT_ERROR);
            return;
        };

        // Subscribe to adapter events first so a fast disconnect is not missed.
        let Some(mut central_events) = setup_step(
            self.adapter.events().await,
            "subscribe to adapter events",
            &self.address,
            &self.events,
        ) else {
            return;
        };

        let Some(connected) =
            until_closed(&mut self.commands, &self.events, peripheral.connect()).await
        else {
            // The attempt may still complete at the OS level.
            disconnect(&peripheral, &self.address).await;
            return;
        };
        if setup_step(connected, "connect", &self.address, &self.events).is_none() {
            return;
        }

        info!("Successfully connected to {}", self.address);
        self.events.deliver(LinkEvent::ConnectionChanged {
            connected: true,
            status: GATT_SUCCESS,
        });

        let mut notifications = match peripheral.notifications().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Failed to get notifications stream: {}", e);
                None
            }
        };

        let peripheral_id = peripheral.id();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request(request)) => {
                        let completion = execute(&peripheral, &request).await;
                        self.events.deliver(completion);
                    }
                    Some(Command::Close) | None => break,
                },
                Some(notification) = next_item(&mut notifications) => {
                    trace!(
                        "Notification from {}: {} bytes",
                        notification.uuid,
                        notification.value.len()
                    );
                    self.events.deliver(LinkEvent::CharacteristicChanged {
                        uuid: notification.uuid,
                        value: notification.value,
                    });
                }
                event = central_events.next() => match event {
                    Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                        info!("Peripheral {} disconnected", self.address);
                        self.report_disconnected(GATT_SUCCESS);
                        return;
                    }
                    Some(_) => {}
                    None => {
                        warn!("Adapter event stream ended while connected to {}", self.address);
                        self.report_disconnected(GATT_ERROR);
                        break;
                    }
                },
            }
        }

        disconnect(&peripheral, &self.address).await;
    }

    async fn find_peripheral(&self) -> Option<Peripheral> {
        let peripherals = match self.adapter.peripherals().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to list peripherals: {}", e);
                return None;
            }
        };

        peripherals
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(&self.address))
    }

    fn report_disconnected(&self, status: i32) {
        self.events.deliver(LinkEvent::ConnectionChanged {
            connected: false,
            status,
        });
    }
}

/// Poll an optional stream; pending forever when absent.
async fn next_item<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(s) => s.next().await,
        None => futures::future::pending().await,
    }
}

/// Run one GATT request to completion and produce its completion event.
async fn execute(peripheral: &Peripheral, request: &GattRequest) -> LinkEvent {
    match request {
        GattRequest::DiscoverServices => match peripheral.discover_services().await {
            Ok(()) => LinkEvent::ServicesDiscovered(Ok(service_tree(peripheral))),
            Err(e) => {
                warn!("Failed to discover services: {}", e);
                request.failed(GATT_FAILURE)
            }
        },

        GattRequest::Read { characteristic } => {
            let Some(target) = find_characteristic(peripheral, characteristic) else {
                return request.failed(GATT_FAILURE);
            };

            match peripheral.read(&target).await {
                Ok(value) => LinkEvent::CharacteristicRead {
                    uuid: *characteristic,
                    status: GATT_SUCCESS,
                    value,
                },
                Err(e) => {
                    warn!("Failed to read {}: {}", characteristic, e);
                    request.failed(GATT_FAILURE)
                }
            }
        }

        // btleplug writes the CCCD itself as part of (un)subscribe.
        GattRequest::WriteDescriptor {
            characteristic,
            descriptor,
            value,
        } => {
            let Some(target) = find_characteristic(peripheral, characteristic) else {
                return request.failed(GATT_FAILURE);
            };

            let result = if *value == DISABLE_NOTIFICATION_VALUE {
                peripheral.unsubscribe(&target).await
            } else {
                peripheral.subscribe(&target).await
            };

            match result {
                Ok(()) => LinkEvent::DescriptorWritten {
                    characteristic: *characteristic,
                    descriptor: *descriptor,
                    status: GATT_SUCCESS,
                },
                Err(e) => {
                    warn!("Failed to write CCCD of {}: {}", characteristic, e);
                    request.failed(GATT_FAILURE)
                }
            }
        }
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: &Uuid) -> Option<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == *uuid)
}

fn service_tree(peripheral: &Peripheral) -> Vec<ServiceDescriptor> {
    peripheral
        .services()
        .into_iter()
        .map(|service| {
            let characteristics = service
                .characteristics
                .iter()
                .map(characteristic_descriptor)
                .collect();
            ServiceDescriptor::new(service.uuid, characteristics)
        })
        .collect()
}

fn characteristic_descriptor(characteristic: &Characteristic) -> CharacteristicDescriptor {
    CharacteristicDescriptor::new(
        characteristic.uuid,
        characteristic_properties(characteristic.properties),
        // Some backends hide the CCCD and manage it during subscribe.
        characteristic
            .descriptors
            .iter()
            .any(|d| d.uuid == CLIENT_CHARACTERISTIC_CONFIG_UUID)
            || characteristic
                .properties
                .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    )
}

fn characteristic_properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        readable: flags.contains(CharPropFlags::READ),
        writable: flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notifiable: flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::{ConnectionState, GattLink, LinkConfig, LinkUpdate};
    use crate::ble::scanner::ScanSession;
    use crate::permission::AllowAll;
    use crate::testing::FakeRadio;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_len(log: &Arc<Mutex<Vec<&'static str>>>, len: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while log.lock().len() < len {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_next_driver_waits_for_previous_to_release() {
        let drivers = TaskChain::default();
        let runtime = Handle::current();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Old driver still stuck in connect
        let old = log.clone();
        drivers.spawn(&runtime, move |_| async move {
            let _ = release_rx.await;
            old.lock().push("old disconnected");
        });

        let new = log.clone();
        drivers.spawn(&runtime, move |previous| async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            new.lock().push("new connected");
        });

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(log.lock().is_empty());

        release_tx.send(()).unwrap();
        wait_for_len(&log, 2).await;
        assert_eq!(*log.lock(), vec!["old disconnected", "new connected"]);
    }

    #[tokio::test]
    async fn test_restart_waits_for_stop() {
        let tasks = TaskChain::default();
        let runtime = Handle::current();
        let log = Arc::new(Mutex::new(Vec::new()));

        // A running scan never finishes on its own.
        tasks.spawn(&runtime, |_| futures::future::pending::<()>());

        let stop = log.clone();
        tasks.spawn(&runtime, move |previous| {
            if let Some(scan) = &previous {
                scan.abort();
            }
            async move {
                if let Some(scan) = previous {
                    let _ = scan.await;
                }
                tokio::task::yield_now().await;
                stop.lock().push("stop_scan");
            }
        });

        let start = log.clone();
        tasks.spawn(&runtime, move |previous| async move {
            if let Some(stop) = previous {
                let _ = stop.await;
            }
            start.lock().push("start_scan");
        });

        wait_for_len(&log, 2).await;
        assert_eq!(*log.lock(), vec!["stop_scan", "start_scan"]);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_connect() {
        let radio = FakeRadio::new();
        let (link, _rx) = GattLink::new(
            Arc::new(radio.clone()),
            Arc::new(AllowAll),
            LinkConfig::default(),
        );
        link.connect(Device::new("AA:BB:CC:DD:EE:01", None)).unwrap();

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        command_tx.send(Command::Close).unwrap();

        let outcome = until_closed(
            &mut command_rx,
            &radio.sink(0),
            futures::future::pending::<btleplug::Result<()>>(),
        )
        .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_until_closed_returns_completed_output() {
        let radio = FakeRadio::new();
        let (link, _rx) = GattLink::new(
            Arc::new(radio.clone()),
            Arc::new(AllowAll),
            LinkConfig::default(),
        );
        link.connect(Device::new("AA:BB:CC:DD:EE:01", None)).unwrap();

        let (_command_tx, mut command_rx) = mpsc::unbounded_channel();
        let outcome = until_closed(&mut command_rx, &radio.sink(0), async { 7 }).await;
        assert_eq!(outcome, Some(7));
    }

    #[test]
    fn test_adapter_events_failure_fails_connect() {
        let radio = FakeRadio::new();
        let (link, mut rx) = GattLink::new(
            Arc::new(radio.clone()),
            Arc::new(AllowAll),
            LinkConfig::default(),
        );
        link.connect(Device::new("AA:BB:CC:DD:EE:01", None)).unwrap();

        let events = setup_step::<()>(
            Err(btleplug::Error::NotConnected),
            "subscribe to adapter events",
            "AA:BB:CC:DD:EE:01",
            &radio.sink(0),
        );

        assert!(events.is_none());
        assert_eq!(link.state(), ConnectionState::Disconnected);
        let updates: Vec<_> = std::iter::from_fn(|| rx.try_recv())
            .map(|u| u.unwrap())
            .collect();
        assert!(updates.iter().any(|u| matches!(
            u,
            LinkUpdate::Error(Error::ConnectFailed { code }) if *code == GATT_ERROR
        )));
    }

    #[tokio::test]
    async fn test_scan_fails_when_adapter_events_end() {
        let radio = FakeRadio::new();
        let session = ScanSession::new(Arc::new(radio.clone()), Arc::new(AllowAll));
        session.start(None).unwrap();

        let mut handled = 0;
        drive_scan(
            futures::stream::empty::<CentralEvent>(),
            &radio.scan_sink(0),
            |_| {
                handled += 1;
                async {}
            },
        )
        .await;

        assert_eq!(handled, 0);
        assert!(!session.is_scanning());
        let results: Vec<_> = session.devices().collect().await;
        assert!(matches!(
            results.as_slice(),
            [Err(Error::ScanError {
                code: SCAN_FAILED_INTERNAL_ERROR
            })]
        ));
    }

    #[test]
    fn test_characteristic_properties() {
        let props = characteristic_properties(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert_eq!(props, CharacteristicProperties::READ_NOTIFY);

        let props = characteristic_properties(CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert!(props.writable);
        assert!(!props.readable);
        assert!(!props.notifiable);

        let props = characteristic_properties(CharPropFlags::INDICATE);
        assert!(props.notifiable);
    }

    #[test]
    fn test_encode_advertisement() {
        let properties = PeripheralProperties {
            local_name: Some("HRM".to_string()),
            services: vec![HEART_RATE_SERVICE_UUID],
            manufacturer_data: [(0x004C, vec![0xAA])].into_iter().collect(),
            ..Default::default()
        };

        let encoded = encode_advertisement(&properties);
        assert_eq!(
            encoded.as_ref(),
            &[
                0x04, AD_COMPLETE_LOCAL_NAME, b'H', b'R', b'M',
                0x03, AD_INCOMPLETE_16BIT_SERVICES, 0x0D, 0x18,
                0x04, AD_MANUFACTURER_DATA, 0x4C, 0x00, 0xAA,
            ]
        );
    }

    #[test]
    fn test_encode_advertisement_128bit_service() {
        let vendor = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
        let properties = PeripheralProperties {
            services: vec![vendor],
            ..Default::default()
        };

        let encoded = encode_advertisement(&properties);
        assert_eq!(encoded.len(), 18);
        assert_eq!(encoded[0], 17);
        assert_eq!(encoded[1], AD_INCOMPLETE_128BIT_SERVICES);
        // Little-endian on air.
        assert_eq!(encoded[2], 0x9e);
        assert_eq!(encoded[17], 0x6e);
    }

    #[test]
    fn test_encode_empty_advertisement() {
        assert!(encode_advertisement(&PeripheralProperties::default()).is_empty());
    }

    #[test]
    fn test_scan_result_from_properties() {
        let properties = PeripheralProperties {
            local_name: Some("Scale".to_string()),
            rssi: Some(-70),
            services: vec![BATTERY_SERVICE_UUID],
            ..Default::default()
        };

        let result = scan_result(&properties);
        assert_eq!(result.device.name.as_deref(), Some("Scale"));
        assert_eq!(result.device.address, properties.address.to_string());
        assert_eq!(result.rssi, Some(-70));
        assert_eq!(result.service_uuids, vec![BATTERY_SERVICE_UUID]);
    }
}
