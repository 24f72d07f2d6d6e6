//! # audio-duplex-windows
//!
//! Windows WASAPI backend for audio-duplex-kit.
//!
//! Provides:
//! - `WasapiBackend` — `AudioBackend` implementation tying everything together
//! - `WasapiCapture` — capture endpoint; loopback on render devices, direct on capture devices
//! - `WasapiRender` — render endpoint feeding a playback stream from the ring buffer
//! - `DeviceEnumerator` — audio device enumeration via the MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_duplex_core::{DuplexSession, SessionConfig};
//! use audio_duplex_windows::WasapiBackend;
//!
//! let backend = Arc::new(WasapiBackend::new());
//! let config = SessionConfig::new(source_id, destination_id);
//! let mut session = DuplexSession::new(backend, config);
//! session.start()?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod backend;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;
#[cfg(target_os = "windows")]
pub mod wasapi_render;

#[cfg(target_os = "windows")]
pub use backend::WasapiBackend;
#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiCapture;
#[cfg(target_os = "windows")]
pub use wasapi_render::WasapiRender;
