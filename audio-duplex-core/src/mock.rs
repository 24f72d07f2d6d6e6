//! In-memory backend for tests and off-platform development.
//!
//! `MockBackend` stands in for an OS audio backend: devices are plain
//! entries in a map, endpoints record their lifecycle into a shared event
//! log, and faults can be injected onto the latch of the most recently
//! opened session. No OS resources, no threads, no real-time behavior.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::device::{DeviceFlow, DeviceInfo};
use crate::models::error::{DuplexError, FaultReason};
use crate::models::format::AudioFormat;
use crate::models::state::SessionState;
use crate::session::fault::FaultLatch;
use crate::traits::audio_backend::{AudioBackend, EndpointSpec};
use crate::traits::endpoint::Endpoint;
use crate::traits::session_observer::SessionObserver;

const DEFAULT_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 48_000,
    channels: 2,
    bits_per_sample: 32,
};

#[derive(Default)]
struct MockShared {
    devices: Mutex<Vec<DeviceInfo>>,
    formats: Mutex<HashMap<String, AudioFormat>>,
    fail_start: Mutex<Vec<String>>,
    events: Mutex<Vec<String>>,
    latches: Mutex<Vec<Arc<FaultLatch>>>,
}

/// Scriptable `AudioBackend` whose endpoints log every lifecycle step.
#[derive(Default)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_capture_device(&self, id: &str) {
        self.add_device(id, DeviceFlow::Capture);
    }

    pub fn add_render_device(&self, id: &str) {
        self.add_device(id, DeviceFlow::Render);
    }

    fn add_device(&self, id: &str, flow: DeviceFlow) {
        self.shared.devices.lock().push(DeviceInfo {
            id: id.into(),
            name: format!("Mock {id}"),
            flow,
            is_default: false,
            transport: None,
        });
    }

    /// Drop a device from enumeration, as if it were unplugged.
    pub fn remove_device(&self, id: &str) {
        self.shared.devices.lock().retain(|d| d.id != id);
    }

    /// Override the format a device reports (default: 48 kHz stereo f32).
    pub fn set_format(&self, id: &str, format: AudioFormat) {
        self.shared.formats.lock().insert(id.into(), format);
    }

    /// Make `Endpoint::start` fail for the given device.
    pub fn fail_start(&self, id: &str) {
        self.shared.fail_start.lock().push(id.into());
    }

    /// Raise a fault on the latch of the most recently opened endpoints, as
    /// a stream thread would.
    pub fn inject_fault(&self, reason: FaultReason) {
        if let Some(latch) = self.shared.latches.lock().last() {
            latch.raise(reason);
        }
    }

    /// Snapshot of the ordered lifecycle event log
    /// (`open:`/`start:`/`stop:` entries tagged with role and device id).
    pub fn events(&self) -> Vec<String> {
        self.shared.events.lock().clone()
    }

    fn open(
        &self,
        role: &'static str,
        spec: EndpointSpec,
    ) -> Result<Box<dyn Endpoint>, DuplexError> {
        if !self
            .shared
            .devices
            .lock()
            .iter()
            .any(|d| d.id == spec.device_id)
        {
            return Err(DuplexError::DeviceUnavailable(spec.device_id));
        }
        self.shared
            .events
            .lock()
            .push(format!("open:{role}:{}", spec.device_id));
        self.shared.latches.lock().push(Arc::clone(&spec.faults));

        let fail_start = self.shared.fail_start.lock().contains(&spec.device_id);
        Ok(Box::new(MockEndpoint {
            role,
            device_id: spec.device_id,
            shared: Arc::clone(&self.shared),
            fail_start,
            running: false,
        }))
    }
}

impl AudioBackend for MockBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DuplexError> {
        Ok(self.shared.devices.lock().clone())
    }

    fn default_device_id(&self, flow: DeviceFlow) -> Result<String, DuplexError> {
        self.shared
            .devices
            .lock()
            .iter()
            .find(|d| d.flow == flow)
            .map(|d| d.id.clone())
            .ok_or_else(|| DuplexError::DeviceUnavailable(format!("no {flow:?} device")))
    }

    fn device_format(&self, device_id: &str) -> Result<AudioFormat, DuplexError> {
        if !self.shared.devices.lock().iter().any(|d| d.id == device_id) {
            return Err(DuplexError::DeviceUnavailable(device_id.into()));
        }
        Ok(self
            .shared
            .formats
            .lock()
            .get(device_id)
            .copied()
            .unwrap_or(DEFAULT_FORMAT))
    }

    fn open_capture(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError> {
        self.open("capture", spec)
    }

    fn open_render(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError> {
        self.open("render", spec)
    }
}

struct MockEndpoint {
    role: &'static str,
    device_id: String,
    shared: Arc<MockShared>,
    fail_start: bool,
    running: bool,
}

impl Endpoint for MockEndpoint {
    fn start(&mut self) -> Result<(), DuplexError> {
        if self.fail_start {
            return Err(DuplexError::DeviceUnavailable(format!(
                "{} refused to start",
                self.device_id
            )));
        }
        self.shared
            .events
            .lock()
            .push(format!("start:{}:{}", self.role, self.device_id));
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shared
            .events
            .lock()
            .push(format!("stop:{}:{}", self.role, self.device_id));
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Observer that records everything it is told, for assertions.
#[derive(Default)]
pub struct MockObserver {
    states: Mutex<Vec<SessionState>>,
    faults: Mutex<Vec<FaultReason>>,
}

impl MockObserver {
    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().clone()
    }

    pub fn faults(&self) -> Vec<FaultReason> {
        self.faults.lock().clone()
    }
}

impl SessionObserver for MockObserver {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.clone());
    }

    fn on_fault(&self, reason: &FaultReason) {
        self.faults.lock().push(reason.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_and_format_probe() {
        let backend = MockBackend::new();
        backend.add_capture_device("mic");
        backend.add_render_device("spk");

        assert_eq!(backend.list_devices().unwrap().len(), 2);
        assert_eq!(backend.default_device_id(DeviceFlow::Render).unwrap(), "spk");
        assert_eq!(backend.device_format("mic").unwrap(), DEFAULT_FORMAT);
        assert!(backend.device_format("ghost").is_err());
    }

    #[test]
    fn device_exists_follows_enumeration() {
        let backend = MockBackend::new();
        backend.add_render_device("spk");
        assert!(backend.device_exists("spk").unwrap());
        backend.remove_device("spk");
        assert!(!backend.device_exists("spk").unwrap());
    }
}
