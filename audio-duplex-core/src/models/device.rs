use serde::{Deserialize, Serialize};

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFlow {
    /// Produces audio into the system (microphone-like).
    Capture,
    /// Consumes audio for playback (speaker-like). Render endpoints can also
    /// be tapped in loopback mode to duplicate "what you hear."
    Render,
}

/// Transport type for an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTransport {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// An audio device as seen by the OS device enumerator.
///
/// The `id` is an opaque OS-specific handle; this core never parses or
/// constructs it, only passes it back to the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub flow: DeviceFlow,
    pub is_default: bool,
    pub transport: Option<DeviceTransport>,
}
