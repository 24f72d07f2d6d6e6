//! WASAPI capture endpoint.
//!
//! Duplicating "what you hear" means opening the *source render* device with
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`; a true input device (microphone, line-in)
//! is opened in direct capture mode instead. Either way, every packet the
//! device delivers is written byte-for-byte into the session's ring buffer.
//!
//! The stream loop runs on a dedicated MMCSS-registered thread and stays
//! allocation- and logging-free while hot; oversized packets are discarded
//! against a safety ceiling, and stream errors are classified onto the
//! session's fault latch rather than thrown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use audio_duplex_core::models::error::{DuplexError, FaultReason};
use audio_duplex_core::traits::audio_backend::EndpointSpec;
use audio_duplex_core::traits::endpoint::Endpoint;

use crate::com::{self, ComGuard, MixFormat};

/// A single anomalous packet larger than this is treated as corrupt and
/// discarded instead of written, bounding the stall one bad callback can
/// cause.
const MAX_CHUNK_BYTES: usize = 1024 * 1024;

/// How long `start` waits for the stream thread to finish WASAPI setup.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture endpoint bound at construction to one device, one ring buffer,
/// and one fault latch.
pub struct WasapiCapture {
    spec: EndpointSpec,
    loopback: bool,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WasapiCapture {
    /// `loopback` selects tapping a render device's output mix over reading
    /// a capture device directly.
    pub fn new(spec: EndpointSpec, loopback: bool) -> Self {
        Self {
            spec,
            loopback,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Endpoint for WasapiCapture {
    fn start(&mut self) -> Result<(), DuplexError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DuplexError::InvalidState(
                "capture endpoint already running".into(),
            ));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let spec = self.spec.clone();
        let loopback = self.loopback;
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("wasapi-capture".into())
            .spawn(move || {
                capture_thread(spec, loopback, &running, ready_tx);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DuplexError::Backend(format!("failed to spawn capture thread: {e}")))?;

        // Surface WASAPI setup failures synchronously from start().
        match ready_rx.recv_timeout(INIT_TIMEOUT) {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(DuplexError::Stream(
                    "timed out waiting for capture stream setup".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WasapiCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureStream {
    _com: ComGuard,
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    block_align: usize,
    /// Preallocated zeros for SILENT-flagged packets; the hot loop never
    /// allocates.
    scratch: Vec<u8>,
}

/// Stream thread body: set up, report readiness, run the hot loop, tear down.
fn capture_thread(
    spec: EndpointSpec,
    loopback: bool,
    running: &AtomicBool,
    ready_tx: SyncSender<Result<(), DuplexError>>,
) {
    let stream = match open_stream(&spec, loopback) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let discarded = capture_loop(&stream, &spec, running);

    unsafe {
        let _ = stream.audio_client.Stop();
    }
    if discarded > 0 {
        log::warn!(
            "capture on {}: discarded {discarded} oversized packet(s)",
            spec.device_id
        );
    }
    log::debug!("capture stream on {} exited", spec.device_id);
}

/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Look the device up by id
/// 3. Activate IAudioClient, verify the mix format still matches the session
/// 4. Initialize shared mode (+ LOOPBACK when tapping a render device)
/// 5. Get IAudioCaptureClient, register with MMCSS, Start
fn open_stream(spec: &EndpointSpec, loopback: bool) -> Result<CaptureStream, DuplexError> {
    unsafe {
        let com = ComGuard::init()?;
        let enumerator = com::create_enumerator()?;
        let device = com::device_by_id(&enumerator, &spec.device_id)?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| com::classify_open_error("Activate", &e))?;

        let mix = MixFormat::query(&audio_client)?;
        if mix.format() != spec.format {
            // The device changed format between the session's probe and now.
            return Err(DuplexError::FormatMismatch(format!(
                "device streams {}, session negotiated {}",
                mix.format(),
                spec.format
            )));
        }

        let mut stream_flags = AUDCLNT_STREAMFLAGS_NOPERSIST;
        if loopback {
            stream_flags |= AUDCLNT_STREAMFLAGS_LOOPBACK;
        }

        // Ask for two periods of device buffering; shared mode may round up.
        let buffer_duration = com::to_reference_time(spec.period * 2);
        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                stream_flags,
                buffer_duration,
                0,
                mix.as_raw(),
                None,
            )
            .map_err(|e| com::classify_open_error("IAudioClient::Initialize", &e))?;

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| com::classify_open_error("GetService", &e))?;

        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| com::classify_open_error("GetBufferSize", &e))?;

        // MMCSS registration for real-time priority
        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle =
            AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| com::classify_open_error("IAudioClient::Start", &e))?;

        let block_align = mix.block_align();
        Ok(CaptureStream {
            _com: com,
            audio_client,
            capture_client,
            block_align,
            scratch: vec![0u8; buffer_frames as usize * block_align],
        })
    }
}

/// Hot loop: drain every pending packet into the ring buffer, then sleep
/// half a period. Returns the number of discarded oversized packets.
///
/// Overflow (ring full) is the ring buffer's clamp-and-count policy, not
/// handled here; the loop never retries or stalls on a full buffer.
fn capture_loop(stream: &CaptureStream, spec: &EndpointSpec, running: &AtomicBool) -> u64 {
    let poll = (spec.period / 2)
        .max(Duration::from_millis(1))
        .min(Duration::from_millis(10));
    let mut discarded: u64 = 0;

    while running.load(Ordering::SeqCst) {
        thread::sleep(poll);

        if let Err(e) = drain_packets(stream, spec, &mut discarded) {
            // A failure caused by our own stop() racing the loop is not a
            // session fault.
            if running.load(Ordering::SeqCst) {
                spec.faults.raise(e);
            }
            break;
        }
    }

    discarded
}

fn drain_packets(
    stream: &CaptureStream,
    spec: &EndpointSpec,
    discarded: &mut u64,
) -> Result<(), FaultReason> {
    unsafe {
        let mut packet_length = stream
            .capture_client
            .GetNextPacketSize()
            .map_err(|e| com::classify_stream_fault("GetNextPacketSize", &e))?;

        while packet_length > 0 {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut num_frames: u32 = 0;
            let mut flags: u32 = 0;

            stream
                .capture_client
                .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                .map_err(|e| com::classify_stream_fault("GetBuffer", &e))?;

            if num_frames > 0 && !buffer_ptr.is_null() {
                let byte_len = num_frames as usize * stream.block_align;

                if byte_len > MAX_CHUNK_BYTES {
                    *discarded += 1;
                } else if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                    // DRM-silenced or muted source: keep the timeline by
                    // writing zeros instead of stale device memory.
                    let n = byte_len.min(stream.scratch.len());
                    spec.buffer.lock().write(&stream.scratch[..n]);
                } else {
                    let bytes = std::slice::from_raw_parts(buffer_ptr, byte_len);
                    spec.buffer.lock().write(bytes);
                }
            }

            stream
                .capture_client
                .ReleaseBuffer(num_frames)
                .map_err(|e| com::classify_stream_fault("ReleaseBuffer", &e))?;

            packet_length = stream
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| com::classify_stream_fault("GetNextPacketSize", &e))?;
        }
    }
    Ok(())
}
