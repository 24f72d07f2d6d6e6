use std::sync::Arc;
use std::time::Duration;

use crate::models::device::{DeviceFlow, DeviceInfo};
use crate::models::error::DuplexError;
use crate::models::format::AudioFormat;
use crate::processing::ring_buffer::SharedRingBuffer;
use crate::session::fault::FaultLatch;
use crate::traits::endpoint::Endpoint;

/// Everything an endpoint needs, handed over at construction.
///
/// The device id is an opaque key from this same backend's enumeration; the
/// ring buffer and fault latch are the only channels the running stream ever
/// touches.
#[derive(Clone)]
pub struct EndpointSpec {
    /// Opaque OS device id, as returned by `list_devices`.
    pub device_id: String,
    /// Format both sides of the session negotiated. The endpoint must refuse
    /// to start if the device no longer honors it.
    pub format: AudioFormat,
    /// Shared buffer: capture writes into it, render reads out of it.
    pub buffer: SharedRingBuffer,
    /// Non-blocking fault sink for stream-thread errors.
    pub faults: Arc<FaultLatch>,
    /// Hardware period to request from the OS stream.
    pub period: Duration,
}

/// Platform audio backend: device enumeration plus endpoint construction.
///
/// Implemented by `WasapiBackend` (Windows) and `MockBackend` (tests). Passed
/// explicitly to sessions and watchdogs; there is no process-wide singleton.
pub trait AudioBackend: Send + Sync {
    /// List currently active devices of both flows.
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DuplexError>;

    /// The OS-default device id for the given flow, if any.
    fn default_device_id(&self, flow: DeviceFlow) -> Result<String, DuplexError>;

    /// The shared-mode format the device would stream with right now.
    fn device_format(&self, device_id: &str) -> Result<AudioFormat, DuplexError>;

    /// Construct a capture endpoint bound to `spec`. Loopback mode when the
    /// device is a render endpoint, direct capture otherwise.
    fn open_capture(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError>;

    /// Construct a render endpoint bound to `spec`.
    fn open_render(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError>;

    /// Whether `device_id` is currently enumerable. Used by the watchdog;
    /// not a real-time path.
    fn device_exists(&self, device_id: &str) -> Result<bool, DuplexError> {
        Ok(self.list_devices()?.iter().any(|d| d.id == device_id))
    }
}
