//! End-to-end session over a scripted radio: scan, connect, discover,
//! subscribe, receive notifications, disconnect.

use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use gatt_session::ble::{
    EventSink, GattConnector, GattHandle, GattRequest, LinkEvent, ScanBackend, ScanEvent, ScanSink,
    CLIENT_CHARACTERISTIC_CONFIG_UUID, GATT_SUCCESS,
};
use gatt_session::{
    AllowAll, CharacteristicDescriptor, CharacteristicProperties, ConnectionState, DecodedValue,
    Device, Error, GattLink, LinkConfig, LinkUpdate, Result, ScanFilter, ScanResult, ScanSession,
    ServiceDescriptor, UpdateReceiver, UpdateSource, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID,
    HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID,
};

#[derive(Default)]
struct Recorded {
    link_sinks: Vec<EventSink>,
    requests: Vec<GattRequest>,
    closed: usize,
    scan_sinks: Vec<ScanSink>,
}

/// Records what the session asks of the radio; the test plays the radio's
/// replies back through the recorded sinks.
#[derive(Clone, Default)]
struct ScriptedRadio(Arc<Mutex<Recorded>>);

impl ScriptedRadio {
    fn reply(&self, event: LinkEvent) {
        let sink = self.0.lock().link_sinks.last().cloned();
        sink.expect("no open connection").deliver(event);
    }

    fn advertise(&self, address: &str, name: &str) {
        let sink = self.0.lock().scan_sinks.last().cloned();
        let result = ScanResult::new(
            Device::new(address, Some(name.to_string())),
            vec![0x02, 0x01, 0x06],
        );
        sink.expect("no scan running")
            .deliver(ScanEvent::Advertisement(result));
    }

    fn requests(&self) -> Vec<GattRequest> {
        self.0.lock().requests.clone()
    }
}

struct ScriptedHandle(Arc<Mutex<Recorded>>);

impl GattHandle for ScriptedHandle {
    fn submit(&mut self, request: GattRequest) -> Result<()> {
        self.0.lock().requests.push(request);
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().closed += 1;
    }
}

impl GattConnector for ScriptedRadio {
    fn open(&self, _device: &Device, events: EventSink) -> Result<Box<dyn GattHandle>> {
        self.0.lock().link_sinks.push(events);
        Ok(Box::new(ScriptedHandle(self.0.clone())))
    }
}

impl ScanBackend for ScriptedRadio {
    fn start_scan(&self, _filter: Option<&ScanFilter>, events: ScanSink) -> Result<()> {
        self.0.lock().scan_sinks.push(events);
        Ok(())
    }

    fn stop_scan(&self) {}
}

fn peripheral_services() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new(
            HEART_RATE_SERVICE_UUID,
            vec![CharacteristicDescriptor::new(
                HEART_RATE_MEASUREMENT_UUID,
                CharacteristicProperties::NOTIFY,
                true,
            )],
        ),
        ServiceDescriptor::new(
            BATTERY_SERVICE_UUID,
            vec![CharacteristicDescriptor::new(
                BATTERY_LEVEL_UUID,
                CharacteristicProperties::READ_NOTIFY,
                true,
            )],
        ),
    ]
}

fn drain(updates: &mut UpdateReceiver<LinkUpdate>) -> Vec<LinkUpdate> {
    std::iter::from_fn(|| updates.try_recv())
        .map(|update| update.expect("unexpected overflow"))
        .collect()
}

fn transitions(updates: &[LinkUpdate]) -> Vec<(ConnectionState, ConnectionState)> {
    updates
        .iter()
        .filter_map(|u| match u {
            LinkUpdate::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_full_session() {
    use ConnectionState::*;

    let radio = ScriptedRadio::default();

    // Scan
    let scan = ScanSession::new(Arc::new(radio.clone()), Arc::new(AllowAll));
    scan.start(None).unwrap();
    radio.advertise("AA:BB:CC:DD:EE:01", "Strap");
    radio.advertise("AA:BB:CC:DD:EE:01", "Strap");
    radio.advertise("AA:BB:CC:DD:EE:02", "Scale");
    scan.stop();

    let found: Vec<Device> = scan
        .devices()
        .map(|d| d.unwrap())
        .collect()
        .await;
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].name.as_deref(), Some("Strap"));

    // Connect with a post-discovery plan
    let config = LinkConfig::default()
        .read_on_ready(BATTERY_LEVEL_UUID)
        .notify_on_ready(HEART_RATE_MEASUREMENT_UUID);
    let (link, mut updates) = GattLink::new(Arc::new(radio.clone()), Arc::new(AllowAll), config);

    link.connect(found[0].clone()).unwrap();
    assert_eq!(link.state(), Connecting);

    radio.reply(LinkEvent::ConnectionChanged {
        connected: true,
        status: GATT_SUCCESS,
    });
    assert_eq!(link.state(), Discovering);
    assert_eq!(radio.requests(), vec![GattRequest::DiscoverServices]);

    radio.reply(LinkEvent::ServicesDiscovered(Ok(peripheral_services())));
    assert_eq!(link.state(), Ready);

    // Only the read is in flight; the CCCD write waits behind it.
    assert_eq!(radio.requests().len(), 2);
    assert_eq!(link.outstanding_operations(), 2);

    radio.reply(LinkEvent::CharacteristicRead {
        uuid: BATTERY_LEVEL_UUID,
        status: GATT_SUCCESS,
        value: vec![85],
    });
    assert_eq!(
        radio.requests().last(),
        Some(&GattRequest::WriteDescriptor {
            characteristic: HEART_RATE_MEASUREMENT_UUID,
            descriptor: CLIENT_CHARACTERISTIC_CONFIG_UUID,
            value: [0x01, 0x00],
        })
    );

    radio.reply(LinkEvent::DescriptorWritten {
        characteristic: HEART_RATE_MEASUREMENT_UUID,
        descriptor: CLIENT_CHARACTERISTIC_CONFIG_UUID,
        status: GATT_SUCCESS,
    });
    assert!(link.is_notifying(&HEART_RATE_MEASUREMENT_UUID));

    radio.reply(LinkEvent::CharacteristicChanged {
        uuid: HEART_RATE_MEASUREMENT_UUID,
        value: vec![0x00, 72],
    });

    let received = drain(&mut updates);
    assert_eq!(
        transitions(&received),
        vec![
            (Disconnected, Connecting),
            (Connecting, Connected),
            (Connected, Discovering),
            (Discovering, Ready),
        ]
    );

    let values: Vec<(DecodedValue, UpdateSource)> = received
        .iter()
        .filter_map(|u| match u {
            LinkUpdate::Characteristic(c) => Some((c.value.clone(), c.source)),
            _ => None,
        })
        .collect();
    assert_eq!(
        values,
        vec![
            (DecodedValue::BatteryPercent(85), UpdateSource::Read),
            (DecodedValue::HeartRate(72), UpdateSource::Notify),
        ]
    );

    assert!(received.iter().any(|u| matches!(
        u,
        LinkUpdate::NotificationsChanged { uuid, enabled: true } if *uuid == HEART_RATE_MEASUREMENT_UUID
    )));

    // Peripheral goes away
    radio.reply(LinkEvent::ConnectionChanged {
        connected: false,
        status: 0x13,
    });
    assert_eq!(link.state(), Disconnected);
    assert_eq!(radio.0.lock().closed, 1);
    assert!(!link.is_notifying(&HEART_RATE_MEASUREMENT_UUID));

    // Late notification from the dead connection changes nothing
    radio.reply(LinkEvent::CharacteristicChanged {
        uuid: HEART_RATE_MEASUREMENT_UUID,
        value: vec![0x00, 90],
    });

    let received = drain(&mut updates);
    assert_eq!(
        transitions(&received),
        vec![(Ready, Disconnecting), (Disconnecting, Disconnected)]
    );
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let radio = ScriptedRadio::default();
    let (link, updates) = GattLink::new(
        Arc::new(radio.clone()),
        Arc::new(AllowAll),
        LinkConfig::default(),
    );
    let device = Device::new("AA:BB:CC:DD:EE:03", None);

    link.connect(device.clone()).unwrap();
    assert!(matches!(
        link.connect(device.clone()),
        Err(Error::AlreadyConnecting)
    ));

    link.close();
    assert_eq!(link.state(), ConnectionState::Disconnected);

    link.connect(device).unwrap();
    assert_eq!(radio.0.lock().link_sinks.len(), 2);
    assert_eq!(radio.0.lock().closed, 1);

    // The first attempt's sink is stale; the second still drives the link.
    let stale = radio.0.lock().link_sinks[0].clone();
    stale.deliver(LinkEvent::ConnectionChanged {
        connected: true,
        status: GATT_SUCCESS,
    });
    assert_eq!(link.state(), ConnectionState::Connecting);

    radio.reply(LinkEvent::ConnectionChanged {
        connected: true,
        status: GATT_SUCCESS,
    });
    assert_eq!(link.state(), ConnectionState::Discovering);

    link.close();
    drop(link);

    // Channel ends once the link is gone.
    let rest: Vec<_> = updates.into_stream().collect().await;
    assert!(rest.iter().all(|u| u.is_ok()));
}
