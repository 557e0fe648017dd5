//! BLE connection management.
//!
//! [`GattLink`] owns a single peripheral connection and drives it through
//! connect, service discovery and read/notify. Radio callbacks enter through
//! an [`EventSink`]; everything the consumer needs to know leaves through an
//! [`UpdateReceiver<LinkUpdate>`].
//!
//! The transition logic lives in [`LinkMachine`], a pure function of
//! `(state, event)` that returns a list of effects. `GattLink` applies those
//! effects to the handle and the update channel under one lock.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{GattConnector, GattHandle, GattRequest, LinkEvent};
use crate::ble::uuids::{CLIENT_CHARACTERISTIC_CONFIG_UUID, GATT_ERROR, GATT_SUCCESS};
use crate::channel::{update_channel, ChannelConfig, UpdateReceiver, UpdateSender};
use crate::data::{
    find_characteristic, CharacteristicUpdate, Device, ServiceDescriptor, UpdateSource,
};
use crate::error::{Error, Result};
use crate::permission::{BluetoothOperation, PermissionGate};
use crate::protocol::codec::{encode_notify_enable, CharacteristicCodec, ENABLE_NOTIFICATION_VALUE};

/// Connection state for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected. Initial and terminal state.
    #[default]
    Disconnected,
    /// Waiting for the radio to report the connection.
    Connecting,
    /// Connected; service discovery not yet issued.
    Connected,
    /// Service discovery in progress.
    Discovering,
    /// Services known; reads and notifications may be requested.
    Ready,
    /// Tearing the connection down.
    Disconnecting,
}

impl ConnectionState {
    /// Check if a physical connection exists.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Discovering | Self::Ready)
    }

    /// Check if the link accepts GATT operations.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Discovering | Self::Disconnecting
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Update delivered to the consumer of a link.
#[derive(Debug)]
pub enum LinkUpdate {
    /// The link changed state.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Service discovery completed; the link is about to become `Ready`.
    ServicesReady(Vec<ServiceDescriptor>),
    /// A characteristic value was read or notified.
    Characteristic(CharacteristicUpdate),
    /// A CCCD write completed and notifications are now on or off.
    NotificationsChanged {
        /// Characteristic whose notifications changed.
        uuid: Uuid,
        /// Whether notifications are enabled.
        enabled: bool,
    },
    /// An asynchronous failure reported by the radio.
    Error(Error),
}

/// Link configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkConfig {
    /// Update channel sizing and overflow policy.
    pub channel: ChannelConfig,
    /// Characteristics to read as soon as the link is `Ready`.
    pub read_on_ready: Vec<Uuid>,
    /// Characteristics to subscribe to as soon as the link is `Ready`.
    pub notify_on_ready: Vec<Uuid>,
}

impl LinkConfig {
    /// Read `uuid` once services are discovered.
    pub fn read_on_ready(mut self, uuid: Uuid) -> Self {
        self.read_on_ready.push(uuid);
        self
    }

    /// Subscribe to `uuid` once services are discovered.
    pub fn notify_on_ready(mut self, uuid: Uuid) -> Self {
        self.notify_on_ready.push(uuid);
        self
    }

    /// Use a different update channel configuration.
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }
}

/// Side effect requested by the state machine.
#[derive(Debug)]
pub enum Effect {
    /// Send a request to the native handle.
    Submit(GattRequest),
    /// Close and drop the native handle.
    Release,
    /// Deliver an update to the consumer.
    Emit(LinkUpdate),
}

/// Pure link state machine.
///
/// Holds the per-connection state: current [`ConnectionState`], service
/// tree, GATT operation queue and active subscriptions.
#[derive(Debug, Default)]
pub struct LinkMachine {
    state: ConnectionState,
    services: Vec<ServiceDescriptor>,
    pending: VecDeque<GattRequest>,
    in_flight: Option<GattRequest>,
    notifying: HashSet<Uuid>,
    read_on_ready: Vec<Uuid>,
    notify_on_ready: Vec<Uuid>,
}

impl LinkMachine {
    /// Create a machine that runs the given post-discovery plan.
    pub fn new(read_on_ready: Vec<Uuid>, notify_on_ready: Vec<Uuid>) -> Self {
        Self {
            read_on_ready,
            notify_on_ready,
            ..Self::default()
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Discovered services. Empty unless `Ready`.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Check if notifications are enabled for `uuid`.
    pub fn is_notifying(&self, uuid: &Uuid) -> bool {
        self.notifying.contains(uuid)
    }

    /// Operations queued or in flight.
    pub fn outstanding(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    /// Validate a connect request and move to `Connecting`.
    pub fn begin_connect(&mut self) -> Result<Vec<Effect>> {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => return Err(Error::AlreadyConnecting),
            _ => return Err(Error::AlreadyConnected),
        }

        let mut effects = Vec::new();
        self.transition(ConnectionState::Connecting, &mut effects);
        Ok(effects)
    }

    /// Tear down from any state. Returns no effects when already disconnected.
    pub fn close(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state != ConnectionState::Disconnected {
            self.teardown(&mut effects);
        }
        effects
    }

    /// Queue a read of `uuid`.
    pub fn read(&mut self, uuid: &Uuid) -> Result<Vec<Effect>> {
        self.require_ready()?;

        let characteristic = find_characteristic(&self.services, uuid)
            .ok_or(Error::CharacteristicNotFound { uuid: *uuid })?;

        if !characteristic.properties.readable {
            return Err(Error::OperationNotSupported {
                uuid: *uuid,
                operation: "read",
            });
        }

        Ok(self.enqueue(GattRequest::Read {
            characteristic: *uuid,
        }))
    }

    /// Queue a CCCD write enabling or disabling notifications on `uuid`.
    pub fn set_notify(&mut self, uuid: &Uuid, enabled: bool) -> Result<Vec<Effect>> {
        self.require_ready()?;

        let characteristic = find_characteristic(&self.services, uuid)
            .ok_or(Error::CharacteristicNotFound { uuid: *uuid })?;

        if !characteristic.properties.notifiable {
            return Err(Error::OperationNotSupported {
                uuid: *uuid,
                operation: "notify",
            });
        }

        if !characteristic.has_cccd {
            return Err(Error::DescriptorNotFound { uuid: *uuid });
        }

        Ok(self.enqueue(GattRequest::WriteDescriptor {
            characteristic: *uuid,
            descriptor: CLIENT_CHARACTERISTIC_CONFIG_UUID,
            value: encode_notify_enable(enabled),
        }))
    }

    /// Advance on a radio event.
    pub fn handle_event(&mut self, event: LinkEvent, codec: &CharacteristicCodec) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            LinkEvent::ConnectionChanged { connected: true, status } => {
                if self.state != ConnectionState::Connecting {
                    debug!("Ignoring connect report in state {}", self.state);
                } else if status != GATT_SUCCESS {
                    self.connect_failed(status, &mut effects);
                } else {
                    self.transition(ConnectionState::Connected, &mut effects);
                    self.transition(ConnectionState::Discovering, &mut effects);
                    effects.push(Effect::Submit(GattRequest::DiscoverServices));
                }
            }

            LinkEvent::ConnectionChanged {
                connected: false,
                status,
            } => match self.state {
                ConnectionState::Disconnected => {
                    debug!("Ignoring disconnect report while disconnected");
                }
                ConnectionState::Connecting => self.connect_failed(status, &mut effects),
                _ => {
                    info!("Peripheral disconnected (status {})", status);
                    self.teardown(&mut effects);
                }
            },

            LinkEvent::ServicesDiscovered(result) => {
                if self.state != ConnectionState::Discovering {
                    debug!("Ignoring discovery result in state {}", self.state);
                    return effects;
                }

                match result {
                    Ok(services) => {
                        debug!("Discovered {} services", services.len());
                        self.services = services;
                        effects.push(Effect::Emit(LinkUpdate::ServicesReady(
                            self.services.clone(),
                        )));
                        self.transition(ConnectionState::Ready, &mut effects);
                        self.run_ready_plan(&mut effects);
                    }
                    Err(code) => {
                        warn!("Service discovery failed with status {}", code);
                        effects.push(Effect::Emit(LinkUpdate::Error(Error::DiscoveryFailed {
                            code,
                        })));
                        self.teardown(&mut effects);
                    }
                }
            }

            LinkEvent::CharacteristicRead {
                uuid,
                status,
                value,
            } => {
                if !self.state.is_ready() {
                    debug!("Ignoring read result for {} in state {}", uuid, self.state);
                    return effects;
                }

                self.complete(|r| matches!(r, GattRequest::Read { characteristic } if *characteristic == uuid));

                if status == GATT_SUCCESS {
                    trace!("Read {} bytes from {}", value.len(), uuid);
                    effects.push(Effect::Emit(LinkUpdate::Characteristic(
                        CharacteristicUpdate {
                            uuid,
                            value: codec.decode(&uuid, &value),
                            source: UpdateSource::Read,
                        },
                    )));
                } else {
                    warn!("Read of {} failed with status {}", uuid, status);
                    effects.push(Effect::Emit(LinkUpdate::Error(Error::ReadFailed {
                        uuid,
                        code: status,
                    })));
                }

                self.pump(&mut effects);
            }

            LinkEvent::CharacteristicChanged { uuid, value } => {
                if !self.state.is_ready() {
                    debug!("Ignoring notification from {} in state {}", uuid, self.state);
                    return effects;
                }

                trace!("Notification from {}: {:02X?}", uuid, value);
                effects.push(Effect::Emit(LinkUpdate::Characteristic(
                    CharacteristicUpdate {
                        uuid,
                        value: codec.decode(&uuid, &value),
                        source: UpdateSource::Notify,
                    },
                )));
            }

            LinkEvent::DescriptorWritten {
                characteristic,
                descriptor,
                status,
            } => {
                if !self.state.is_ready() {
                    debug!(
                        "Ignoring descriptor write on {} in state {}",
                        characteristic, self.state
                    );
                    return effects;
                }

                let completed = self.complete(|r| {
                    matches!(
                        r,
                        GattRequest::WriteDescriptor { characteristic: c, descriptor: d, .. }
                            if *c == characteristic && *d == descriptor
                    )
                });

                let enabled = match completed {
                    Some(GattRequest::WriteDescriptor { value, .. }) => {
                        value == ENABLE_NOTIFICATION_VALUE
                    }
                    _ => {
                        warn!("Unsolicited descriptor write result on {}", characteristic);
                        self.pump(&mut effects);
                        return effects;
                    }
                };

                if status == GATT_SUCCESS {
                    if enabled {
                        self.notifying.insert(characteristic);
                    } else {
                        self.notifying.remove(&characteristic);
                    }
                    debug!(
                        "Notifications {} for {}",
                        if enabled { "enabled" } else { "disabled" },
                        characteristic
                    );
                    effects.push(Effect::Emit(LinkUpdate::NotificationsChanged {
                        uuid: characteristic,
                        enabled,
                    }));
                } else {
                    warn!(
                        "Descriptor write on {} failed with status {}",
                        characteristic, status
                    );
                    effects.push(Effect::Emit(LinkUpdate::Error(
                        Error::DescriptorWriteFailed {
                            uuid: characteristic,
                            code: status,
                        },
                    )));
                }

                self.pump(&mut effects);
            }
        }

        effects
    }

    fn require_ready(&self) -> Result<()> {
        if self.state.is_ready() {
            Ok(())
        } else {
            Err(Error::NotReady { state: self.state })
        }
    }

    fn enqueue(&mut self, request: GattRequest) -> Vec<Effect> {
        debug!("Queueing {:?} ({} outstanding)", request, self.outstanding());
        self.pending.push_back(request);

        let mut effects = Vec::new();
        self.pump(&mut effects);
        effects
    }

    /// Issue the next queued request if nothing is in flight.
    fn pump(&mut self, effects: &mut Vec<Effect>) {
        if self.in_flight.is_some() {
            return;
        }

        if let Some(next) = self.pending.pop_front() {
            self.in_flight = Some(next.clone());
            effects.push(Effect::Submit(next));
        }
    }

    /// Clear the in-flight request if it matches.
    fn complete(&mut self, is_match: impl Fn(&GattRequest) -> bool) -> Option<GattRequest> {
        if self.in_flight.as_ref().map(is_match).unwrap_or(false) {
            self.in_flight.take()
        } else {
            None
        }
    }

    fn run_ready_plan(&mut self, effects: &mut Vec<Effect>) {
        let mut requested = Vec::new();
        for uuid in self.read_on_ready.clone() {
            requested.push(self.read(&uuid));
        }
        for uuid in self.notify_on_ready.clone() {
            requested.push(self.set_notify(&uuid, true));
        }

        for result in requested {
            match result {
                Ok(mut queued) => effects.append(&mut queued),
                Err(e) => {
                    warn!("Post-discovery request skipped: {}", e);
                    effects.push(Effect::Emit(LinkUpdate::Error(e)));
                }
            }
        }
    }

    fn connect_failed(&mut self, status: i32, effects: &mut Vec<Effect>) {
        let code = if status == GATT_SUCCESS { GATT_ERROR } else { status };
        warn!("Connection failed with status {}", code);
        effects.push(Effect::Emit(LinkUpdate::Error(Error::ConnectFailed { code })));
        self.teardown(effects);
    }

    fn teardown(&mut self, effects: &mut Vec<Effect>) {
        self.transition(ConnectionState::Disconnecting, effects);

        self.services.clear();
        self.pending.clear();
        self.in_flight = None;
        self.notifying.clear();
        effects.push(Effect::Release);

        self.transition(ConnectionState::Disconnected, effects);
    }

    fn transition(&mut self, to: ConnectionState, effects: &mut Vec<Effect>) {
        let from = self.state;
        if from == to {
            return;
        }

        debug!("Connection state changed: {} -> {}", from, to);
        self.state = to;
        effects.push(Effect::Emit(LinkUpdate::StateChanged { from, to }));
    }
}

/// Mutable per-link state behind the lock.
struct LinkCore {
    machine: LinkMachine,
    handle: Option<Box<dyn GattHandle>>,
    device: Option<Device>,
    generation: u64,
    updates: UpdateSender<LinkUpdate>,
}

impl LinkCore {
    fn apply(&mut self, effects: Vec<Effect>, codec: &CharacteristicCodec) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Emit(update) => {
                    self.updates.send(update);
                }
                Effect::Release => self.release(),
                Effect::Submit(request) => {
                    let submitted = match self.handle.as_mut() {
                        Some(handle) => handle.submit(request.clone()),
                        None => Err(Error::NotReady {
                            state: self.machine.state(),
                        }),
                    };

                    if let Err(e) = submitted {
                        warn!("Failed to submit {:?}: {}", request, e);
                        queue.extend(self.machine.handle_event(request.rejected(), codec));
                    }
                }
            }
        }
    }

    /// Close the native handle and invalidate outstanding callbacks.
    fn release(&mut self) {
        self.generation += 1;
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        if let Some(device) = self.device.take() {
            info!("Released connection to {}", device);
        }
    }
}

struct LinkShared {
    core: Mutex<LinkCore>,
    codec: CharacteristicCodec,
}

/// Entry point for radio callbacks into a [`GattLink`].
///
/// Each sink is bound to the connection attempt it was created for. Once
/// that connection is closed, events delivered through it are discarded.
#[derive(Clone)]
pub struct EventSink {
    shared: Weak<LinkShared>,
    generation: u64,
}

impl EventSink {
    /// Deliver a radio event. Safe to call from any thread.
    pub fn deliver(&self, event: LinkEvent) {
        let Some(shared) = self.shared.upgrade() else {
            trace!("Link dropped, discarding {:?}", event);
            return;
        };

        let mut core = shared.core.lock();
        if core.generation != self.generation {
            debug!("Discarding stale event {:?}", event);
            return;
        }

        let effects = core.machine.handle_event(event, &shared.codec);
        core.apply(effects, &shared.codec);
    }

    /// Check if events delivered through this sink would still be applied.
    pub fn is_current(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| shared.core.lock().generation == self.generation)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// A single-device GATT session.
///
/// At most one native handle is held at a time. `connect` is only accepted
/// from `Disconnected`, and every path back to `Disconnected` releases the
/// handle before returning.
pub struct GattLink {
    shared: Arc<LinkShared>,
    connector: Arc<dyn GattConnector>,
    gate: Arc<dyn PermissionGate>,
}

impl GattLink {
    /// Create a link using the default characteristic codec.
    pub fn new(
        connector: Arc<dyn GattConnector>,
        gate: Arc<dyn PermissionGate>,
        config: LinkConfig,
    ) -> (Self, UpdateReceiver<LinkUpdate>) {
        Self::with_codec(connector, gate, config, CharacteristicCodec::default())
    }

    /// Create a link with a custom characteristic codec.
    pub fn with_codec(
        connector: Arc<dyn GattConnector>,
        gate: Arc<dyn PermissionGate>,
        config: LinkConfig,
        codec: CharacteristicCodec,
    ) -> (Self, UpdateReceiver<LinkUpdate>) {
        let (updates, receiver) = update_channel(config.channel);

        let core = LinkCore {
            machine: LinkMachine::new(config.read_on_ready, config.notify_on_ready),
            handle: None,
            device: None,
            generation: 0,
            updates,
        };

        let link = Self {
            shared: Arc::new(LinkShared {
                core: Mutex::new(core),
                codec,
            }),
            connector,
            gate,
        };

        (link, receiver)
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.core.lock().machine.state()
    }

    /// Check if the link accepts GATT operations.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Services discovered on the current connection.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.shared.core.lock().machine.services().to_vec()
    }

    /// The device this link is connected or connecting to.
    pub fn device(&self) -> Option<Device> {
        self.shared.core.lock().device.clone()
    }

    /// Check if notifications are enabled for a characteristic.
    pub fn is_notifying(&self, uuid: &Uuid) -> bool {
        self.shared.core.lock().machine.is_notifying(uuid)
    }

    /// Number of GATT operations queued or in flight.
    pub fn outstanding_operations(&self) -> usize {
        self.shared.core.lock().machine.outstanding()
    }

    /// Begin connecting to `device`.
    ///
    /// Returns as soon as the request is issued. Progress is reported as
    /// [`LinkUpdate::StateChanged`]; the link discovers services on its own
    /// once connected.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] if the gate refuses, [`Error::AlreadyConnecting`]
    /// or [`Error::AlreadyConnected`] unless `Disconnected`, or the
    /// connector's error if the connection cannot be opened.
    pub fn connect(&self, device: Device) -> Result<()> {
        if !self.gate.is_permitted(BluetoothOperation::Connect) {
            return Err(Error::PermissionDenied {
                operation: BluetoothOperation::Connect,
            });
        }

        let mut core = self.shared.core.lock();

        // Validate before touching the radio; a rejected connect mutates nothing.
        if core.machine.state() != ConnectionState::Disconnected {
            return core.machine.begin_connect().map(|_| ());
        }

        info!("Connecting to {}", device);

        let sink = EventSink {
            shared: Arc::downgrade(&self.shared),
            generation: core.generation,
        };
        let handle = self.connector.open(&device, sink)?;

        let effects = core.machine.begin_connect()?;
        core.handle = Some(handle);
        core.device = Some(device);
        core.apply(effects, &self.shared.codec);

        Ok(())
    }

    /// Request a characteristic read. The value arrives as a
    /// [`LinkUpdate::Characteristic`] with [`UpdateSource::Read`].
    pub fn read_characteristic(&self, uuid: &Uuid) -> Result<()> {
        let mut core = self.shared.core.lock();
        let effects = core.machine.read(uuid)?;
        core.apply(effects, &self.shared.codec);
        Ok(())
    }

    /// Enable or disable notifications by writing the characteristic's CCCD.
    /// Completion arrives as [`LinkUpdate::NotificationsChanged`].
    pub fn set_notify(&self, uuid: &Uuid, enabled: bool) -> Result<()> {
        let mut core = self.shared.core.lock();
        let effects = core.machine.set_notify(uuid, enabled)?;
        core.apply(effects, &self.shared.codec);
        Ok(())
    }

    /// Disconnect and release the native handle.
    ///
    /// Valid from any state and always leaves the link `Disconnected`. No
    /// callback from the closed connection changes state after this returns.
    /// A no-op when already disconnected.
    pub fn close(&self) {
        let mut core = self.shared.core.lock();
        let effects = core.machine.close();
        if effects.is_empty() {
            debug!("Link already closed");
            return;
        }

        info!("Closing link");
        core.apply(effects, &self.shared.codec);
    }
}

impl Drop for GattLink {
    fn drop(&mut self) {
        self.close();
    }
}
