//! # audio-duplex-core
//!
//! Platform-agnostic audio duplication core library.
//!
//! Duplicates a live audio stream from a source endpoint to an independently
//! clocked destination endpoint with bounded added latency. Platform-specific
//! backends (Windows WASAPI, macOS Core Audio) implement the `AudioBackend`
//! trait and plug into the generic `DuplexSession`.
//!
//! ## Architecture
//!
//! ```text
//! audio-duplex-core (this crate)
//! ├── traits/       ← AudioBackend, Endpoint, SessionObserver
//! ├── models/       ← DuplexError, FaultReason, SessionState, AudioFormat, DeviceInfo, ...
//! ├── processing/   ← RingBuffer (byte-oriented, single writer / single reader)
//! ├── session/      ← DuplexSession (generic orchestrator), FaultLatch
//! ├── watchdog      ← DeviceWatchdog (device presence polling)
//! └── mock          ← MockBackend / MockEndpoint for tests and off-platform UI work
//! ```
//!
//! ## Data flow
//!
//! ```text
//! [Capture Endpoint] → [RingBuffer] → [Render Endpoint]
//!        │                                  │
//!        └────────── FaultLatch ────────────┘
//!                        │
//!             supervisor thread → ordered stop → SessionObserver
//! ```

pub mod mock;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;
pub mod watchdog;

// Re-export key types at crate root for convenience.
pub use models::config::{LatencyPreset, SessionConfig};
pub use models::device::{DeviceFlow, DeviceInfo, DeviceTransport};
pub use models::error::{DuplexError, FaultReason};
pub use models::format::AudioFormat;
pub use models::state::SessionState;
pub use processing::ring_buffer::{BufferStats, RingBuffer, SharedRingBuffer};
pub use session::duplex::DuplexSession;
pub use session::fault::FaultLatch;
pub use traits::audio_backend::{AudioBackend, EndpointSpec};
pub use traits::endpoint::Endpoint;
pub use traits::session_observer::SessionObserver;
pub use watchdog::{DeviceEvent, DeviceWatchdog};
