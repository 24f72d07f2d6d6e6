//! `AudioBackend` implementation over WASAPI.
//!
//! Stateless: every call creates its MMDevice enumerator on the calling
//! thread and drops it before returning, so the backend itself is freely
//! shareable across session, watchdog, and UI threads without holding COM
//! objects anywhere.

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CLSCTX_ALL;

use audio_duplex_core::models::device::{DeviceFlow, DeviceInfo};
use audio_duplex_core::models::error::DuplexError;
use audio_duplex_core::models::format::AudioFormat;
use audio_duplex_core::traits::audio_backend::{AudioBackend, EndpointSpec};
use audio_duplex_core::traits::endpoint::Endpoint;

use crate::com::{self, MixFormat};
use crate::device_enumerator::DeviceEnumerator;
use crate::wasapi_capture::WasapiCapture;
use crate::wasapi_render::WasapiRender;

/// The Windows audio backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for WasapiBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DuplexError> {
        DeviceEnumerator::new()?.list_all()
    }

    fn default_device_id(&self, flow: DeviceFlow) -> Result<String, DuplexError> {
        DeviceEnumerator::new()?.default_device_id(flow)
    }

    fn device_format(&self, device_id: &str) -> Result<AudioFormat, DuplexError> {
        let enumerator = DeviceEnumerator::new()?;
        let device = enumerator.device(device_id)?;
        let audio_client: IAudioClient = unsafe { device.Activate(CLSCTX_ALL, None) }
            .map_err(|e| com::classify_open_error("Activate", &e))?;
        Ok(MixFormat::query(&audio_client)?.format())
    }

    fn open_capture(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError> {
        let flow = DeviceEnumerator::new()?.flow_of(&spec.device_id)?;
        // Tapping a render device means loopback ("what you hear"); a true
        // input device is captured directly.
        let loopback = flow == DeviceFlow::Render;
        Ok(Box::new(WasapiCapture::new(spec, loopback)))
    }

    fn open_render(&self, spec: EndpointSpec) -> Result<Box<dyn Endpoint>, DuplexError> {
        let flow = DeviceEnumerator::new()?.flow_of(&spec.device_id)?;
        if flow != DeviceFlow::Render {
            return Err(DuplexError::InvalidConfiguration(format!(
                "destination {} is not a render endpoint",
                spec.device_id
            )));
        }
        Ok(Box::new(WasapiRender::new(spec)))
    }

    fn device_exists(&self, device_id: &str) -> Result<bool, DuplexError> {
        let enumerator = DeviceEnumerator::new()?;
        let Ok(device) = enumerator.device(device_id) else {
            return Ok(false);
        };
        // GetDevice also resolves unplugged-but-remembered endpoints; only
        // an active device counts as present.
        let state = unsafe { device.GetState() }
            .map_err(|e| DuplexError::Backend(format!("GetState failed: {e}")))?;
        Ok(state == DEVICE_STATE_ACTIVE)
    }
}
