use crate::models::error::DuplexError;

/// A constructed, not-yet-started OS audio stream bound to one device and one
/// ring buffer.
///
/// Binding happens at construction (see `AudioBackend::open_capture` /
/// `open_render`): an endpoint is born knowing its buffer and fault sink, so
/// there is no callback wiring to order against `start`/`stop`.
///
/// An endpoint is either fully started (stream active, callbacks firing) or
/// fully stopped; no partial state is observable to the session.
pub trait Endpoint: Send {
    /// Acquire the OS stream and begin callbacks.
    ///
    /// Fails with `DeviceUnavailable` if the device is absent, disabled, or
    /// exclusively claimed; a failed start leaves the endpoint stopped.
    fn start(&mut self) -> Result<(), DuplexError>;

    /// Halt the stream. When this returns, no further callback fires, so the
    /// shared buffer is safe to tear down.
    ///
    /// Best-effort: OS teardown failures are logged per endpoint and
    /// swallowed so that one endpoint's failure cannot block the other's.
    fn stop(&mut self);

    /// Whether the stream is currently running.
    fn is_running(&self) -> bool;
}
