//! COM plumbing shared by the WASAPI modules: per-thread initialization,
//! device lookup, mix-format reading, and HRESULT classification.

use windows::core::PCWSTR;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use audio_duplex_core::models::error::{DuplexError, FaultReason};
use audio_duplex_core::models::format::AudioFormat;

// AUDCLNT_ERR codes from audioclient.h that this backend distinguishes.
pub const AUDCLNT_E_DEVICE_INVALIDATED: i32 = 0x8889_0004_u32 as i32;
pub const AUDCLNT_E_UNSUPPORTED_FORMAT: i32 = 0x8889_0008_u32 as i32;
pub const AUDCLNT_E_DEVICE_IN_USE: i32 = 0x8889_000A_u32 as i32;
pub const AUDCLNT_E_RESOURCES_INVALIDATED: i32 = 0x8889_0026_u32 as i32;

/// Per-thread COM initialization with balanced teardown.
///
/// If the thread already holds COM in a different mode (STA from a UI
/// framework), keep going and skip the matching CoUninitialize.
pub struct ComGuard {
    should_uninit: bool,
}

impl ComGuard {
    pub fn init() -> Result<Self, DuplexError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            return Ok(Self {
                should_uninit: false,
            });
        }
        hr.ok()
            .map_err(|e| DuplexError::Backend(format!("CoInitializeEx failed: {e}")))?;
        Ok(Self {
            should_uninit: true,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}

/// Owned `*mut WAVEFORMATEX` from `GetMixFormat`, freed on drop.
pub struct MixFormat {
    ptr: *mut WAVEFORMATEX,
}

impl MixFormat {
    /// Read the device's current shared-mode mix format.
    pub fn query(client: &IAudioClient) -> Result<Self, DuplexError> {
        let ptr = unsafe { client.GetMixFormat() }
            .map_err(|e| DuplexError::Stream(format!("GetMixFormat failed: {e}")))?;
        Ok(Self { ptr })
    }

    pub fn as_raw(&self) -> *const WAVEFORMATEX {
        self.ptr
    }

    pub fn format(&self) -> AudioFormat {
        let fmt = unsafe { &*self.ptr };
        AudioFormat {
            sample_rate: fmt.nSamplesPerSec,
            channels: fmt.nChannels,
            bits_per_sample: fmt.wBitsPerSample,
        }
    }

    pub fn block_align(&self) -> usize {
        unsafe { (*self.ptr).nBlockAlign as usize }
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe { CoTaskMemFree(Some(self.ptr as *const _)) };
    }
}

/// Create an MMDevice enumerator on the current (COM-initialized) thread.
pub fn create_enumerator() -> Result<IMMDeviceEnumerator, DuplexError> {
    unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
        .map_err(|e| DuplexError::Backend(format!("failed to create device enumerator: {e}")))
}

/// Look up a device by its opaque endpoint id.
pub fn device_by_id(
    enumerator: &IMMDeviceEnumerator,
    device_id: &str,
) -> Result<IMMDevice, DuplexError> {
    let wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
    unsafe { enumerator.GetDevice(PCWSTR(wide.as_ptr())) }
        .map_err(|_| DuplexError::DeviceUnavailable(device_id.into()))
}

/// Map a start-time WASAPI failure to the synchronous error taxonomy.
pub fn classify_open_error(context: &str, err: &windows::core::Error) -> DuplexError {
    match err.code().0 {
        AUDCLNT_E_DEVICE_INVALIDATED => {
            DuplexError::DeviceUnavailable(format!("{context}: device invalidated"))
        }
        AUDCLNT_E_DEVICE_IN_USE => {
            DuplexError::DeviceUnavailable(format!("{context}: device exclusively held"))
        }
        AUDCLNT_E_UNSUPPORTED_FORMAT => {
            DuplexError::FormatMismatch(format!("{context}: format rejected by device"))
        }
        _ => DuplexError::Stream(format!("{context}: {err}")),
    }
}

/// Classify a mid-stream WASAPI failure for the fault latch.
///
/// Format/resource invalidation is its own subtype: the stream object is not
/// safe to keep using after the device's shared format or routing changed.
pub fn classify_stream_fault(context: &str, err: &windows::core::Error) -> FaultReason {
    match err.code().0 {
        AUDCLNT_E_DEVICE_INVALIDATED => FaultReason::DeviceRemoved,
        AUDCLNT_E_UNSUPPORTED_FORMAT | AUDCLNT_E_RESOURCES_INVALIDATED => {
            FaultReason::FormatChanged
        }
        _ => FaultReason::Stream(format!("{context}: {err}")),
    }
}

/// A `Duration` in the 100-nanosecond units WASAPI expects.
pub fn to_reference_time(duration: std::time::Duration) -> i64 {
    (duration.as_nanos() / 100) as i64
}
