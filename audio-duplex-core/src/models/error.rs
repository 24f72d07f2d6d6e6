use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported synchronously by duplication operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DuplexError {
    /// A precondition on the session configuration failed. No state changed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The operation is not valid in the session's current state
    /// (e.g. `start` while active, `reset` while running). No state changed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A bound device cannot be opened: absent, disabled, or exclusively held.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Source and destination negotiated incompatible formats and this core
    /// performs no resampling.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// An OS stream call failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// A backend-level failure outside any single stream (enumeration, COM init).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Classification of an asynchronous fault raised from a stream thread.
///
/// Stable, machine-distinguishable reason codes; human-readable message
/// formatting is the UI layer's concern.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FaultReason {
    /// The OS invalidated the device mid-stream (unplugged, disabled,
    /// Bluetooth link dropped).
    #[error("device removed")]
    DeviceRemoved,

    /// The device's shared-mode format changed under an active stream.
    /// Treated as a fault in its own right: the stream object cannot be
    /// trusted across this notification.
    #[error("device format changed")]
    FormatChanged,

    /// Any other stream-level error.
    #[error("stream error: {0}")]
    Stream(String),
}
