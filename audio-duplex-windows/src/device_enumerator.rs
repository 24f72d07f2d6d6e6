//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list capture and render endpoints with
//! friendly names, default-device detection, and transport detection
//! (Bluetooth links are the ones that churn, so the UI wants to know).

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use audio_duplex_core::models::device::{DeviceFlow, DeviceInfo, DeviceTransport};
use audio_duplex_core::models::error::DuplexError;

use crate::com::{self, ComGuard};

/// Audio device enumerator using the Windows MMDevice API.
///
/// Owns its COM initialization, so it can be created on any thread; create,
/// use, and drop it within one call rather than holding it across threads.
pub struct DeviceEnumerator {
    _com: ComGuard,
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, DuplexError> {
        let com = ComGuard::init()?;
        let enumerator = com::create_enumerator()?;
        Ok(Self {
            _com: com,
            enumerator,
        })
    }

    /// List active devices of one flow.
    pub fn list(&self, flow: DeviceFlow) -> Result<Vec<DeviceInfo>, DuplexError> {
        let data_flow = match flow {
            DeviceFlow::Capture => eCapture,
            DeviceFlow::Render => eRender,
        };

        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| DuplexError::Backend(format!("EnumAudioEndpoints failed: {e}")))?;

            let count = collection
                .GetCount()
                .map_err(|e| DuplexError::Backend(format!("GetCount failed: {e}")))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut devices = Vec::new();

            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };

                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };

                let name =
                    Self::friendly_name(&device).unwrap_or_else(|| format!("Device {i}"));
                let transport = Self::detect_transport(&device);
                let is_default = default_id.as_deref() == Some(&id);

                devices.push(DeviceInfo {
                    id,
                    name,
                    flow,
                    is_default,
                    transport: Some(transport),
                });
            }

            Ok(devices)
        }
    }

    /// List active devices of both flows, render endpoints first.
    pub fn list_all(&self) -> Result<Vec<DeviceInfo>, DuplexError> {
        let mut devices = self.list(DeviceFlow::Render)?;
        devices.extend(self.list(DeviceFlow::Capture)?);
        Ok(devices)
    }

    /// The OS-default endpoint id for one flow.
    pub fn default_device_id(&self, flow: DeviceFlow) -> Result<String, DuplexError> {
        let data_flow = match flow {
            DeviceFlow::Capture => eCapture,
            DeviceFlow::Render => eRender,
        };
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow, eConsole)
                .map_err(|_| DuplexError::DeviceUnavailable(format!("no default {flow:?} device")))?;

            let id = device
                .GetId()
                .map_err(|e| DuplexError::Backend(format!("GetId failed: {e}")))?;

            Ok(id.to_string().unwrap_or_default())
        }
    }

    /// Which flow a known endpoint id belongs to.
    pub fn flow_of(&self, device_id: &str) -> Result<DeviceFlow, DuplexError> {
        for flow in [DeviceFlow::Render, DeviceFlow::Capture] {
            if self.list(flow)?.iter().any(|d| d.id == device_id) {
                return Ok(flow);
            }
        }
        Err(DuplexError::DeviceUnavailable(device_id.into()))
    }

    /// Open a device by id on this enumerator.
    pub fn device(&self, device_id: &str) -> Result<IMMDevice, DuplexError> {
        com::device_by_id(&self.enumerator, device_id)
    }

    /// Read the PKEY_Device_FriendlyName property from a device.
    fn friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;

            let mut prop = std::mem::zeroed::<PROPVARIANT>();
            store.GetValue(&PKEY_Device_FriendlyName, &mut prop).ok()?;

            let name = if prop.Anonymous.Anonymous.vt == VT_LPWSTR {
                let pwsz = prop.Anonymous.Anonymous.Anonymous.pwszVal;
                if !pwsz.is_null() {
                    let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                    Some(String::from_utf16_lossy(std::slice::from_raw_parts(
                        pwsz, len,
                    )))
                } else {
                    None
                }
            } else {
                None
            };

            PropVariantClear(&mut prop).ok();
            name
        }
    }

    /// Detect the transport type of an audio device from its property store.
    fn detect_transport(device: &IMMDevice) -> DeviceTransport {
        unsafe {
            let store = match device.OpenPropertyStore(STGM_READ) {
                Ok(s) => s,
                Err(_) => return DeviceTransport::Unknown,
            };

            let mut prop = std::mem::zeroed::<PROPVARIANT>();
            if store.GetValue(&PKEY_Device_EnumeratorName, &mut prop).is_ok() {
                if prop.Anonymous.Anonymous.vt == VT_LPWSTR {
                    let pwsz = prop.Anonymous.Anonymous.Anonymous.pwszVal;
                    if !pwsz.is_null() {
                        let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                        let name =
                            String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len));
                        PropVariantClear(&mut prop).ok();

                        if name.contains("BTHENUM") {
                            return DeviceTransport::Bluetooth;
                        }
                        if name.contains("BTHLEENUM") {
                            return DeviceTransport::BluetoothLE;
                        }
                        if name.contains("USB") {
                            return DeviceTransport::Usb;
                        }
                        if name.contains("SWD") {
                            return DeviceTransport::Virtual;
                        }
                    }
                }
                PropVariantClear(&mut prop).ok();
            }

            DeviceTransport::BuiltIn
        }
    }
}
