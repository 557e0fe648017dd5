//! In-memory radio used by unit tests.
//!
//! Records every request and hands back the sinks it was given so tests
//! can play the part of the Bluetooth stack.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::ble::connection::EventSink;
use crate::ble::scanner::{ScanFilter, ScanSink};
use crate::ble::transport::{
    GattConnector, GattHandle, GattRequest, LinkEvent, ScanBackend, ScanEvent,
};
use crate::data::Device;
use crate::error::{Error, Result};

#[derive(Default)]
struct RadioState {
    opened: Vec<Device>,
    sinks: Vec<EventSink>,
    requests: Vec<GattRequest>,
    closed: usize,
    fail_open: bool,
    fail_submit: bool,
    scan_sinks: Vec<ScanSink>,
    scan_filters: Vec<Option<ScanFilter>>,
    scan_stops: usize,
    fail_scan: bool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeRadio {
    state: Arc<Mutex<RadioState>>,
}

impl FakeRadio {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub(crate) fn fail_submit(&self, fail: bool) {
        self.state.lock().fail_submit = fail;
    }

    pub(crate) fn fail_scan(&self, fail: bool) {
        self.state.lock().fail_scan = fail;
    }

    pub(crate) fn opened(&self) -> Vec<Device> {
        self.state.lock().opened.clone()
    }

    pub(crate) fn requests(&self) -> Vec<GattRequest> {
        self.state.lock().requests.clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub(crate) fn open_handles(&self) -> usize {
        let state = self.state.lock();
        state.opened.len() - state.closed
    }

    /// The sink handed to the `index`th `open` call.
    pub(crate) fn sink(&self, index: usize) -> EventSink {
        self.state.lock().sinks[index].clone()
    }

    /// Deliver an event through the most recent connection's sink.
    pub(crate) fn deliver(&self, event: LinkEvent) {
        // Clone out first: delivery re-enters `submit`.
        let sink = self.state.lock().sinks.last().cloned();
        if let Some(sink) = sink {
            sink.deliver(event);
        }
    }

    /// Complete the most recently issued descriptor write.
    pub(crate) fn complete_descriptor_write(&self, status: i32) {
        let last = self
            .state
            .lock()
            .requests
            .iter()
            .rev()
            .find(|r| matches!(r, GattRequest::WriteDescriptor { .. }))
            .cloned();

        if let Some(request) = last {
            self.deliver(request.failed(status));
        }
    }

    pub(crate) fn scan_starts(&self) -> usize {
        self.state.lock().scan_filters.len()
    }

    pub(crate) fn scan_stops(&self) -> usize {
        self.state.lock().scan_stops
    }

    pub(crate) fn scan_sink(&self, index: usize) -> ScanSink {
        self.state.lock().scan_sinks[index].clone()
    }

    /// Deliver a scan event through the most recent scan's sink.
    pub(crate) fn advertise(&self, event: ScanEvent) {
        let sink = self.state.lock().scan_sinks.last().cloned();
        if let Some(sink) = sink {
            sink.deliver(event);
        }
    }
}

struct FakeHandle {
    state: Arc<Mutex<RadioState>>,
}

impl GattHandle for FakeHandle {
    fn submit(&mut self, request: GattRequest) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_submit {
            return Err(Error::Internal("submit rejected".to_string()));
        }
        state.requests.push(request);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed += 1;
    }
}

impl GattConnector for FakeRadio {
    fn open(&self, device: &Device, events: EventSink) -> Result<Box<dyn GattHandle>> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(Error::BluetoothUnavailable);
        }
        state.opened.push(device.clone());
        state.sinks.push(events);

        Ok(Box::new(FakeHandle {
            state: self.state.clone(),
        }))
    }
}

impl ScanBackend for FakeRadio {
    fn start_scan(&self, filter: Option<&ScanFilter>, events: ScanSink) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_scan {
            return Err(Error::ScanError { code: 1 });
        }
        state.scan_filters.push(filter.cloned());
        state.scan_sinks.push(events);
        Ok(())
    }

    fn stop_scan(&self) {
        self.state.lock().scan_stops += 1;
    }
}
