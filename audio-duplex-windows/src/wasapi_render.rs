//! WASAPI render endpoint.
//!
//! Feeds the destination device from the session's ring buffer. Each period
//! the loop asks the device how many frames it can accept, fills exactly
//! that much — held bytes first, silence for the shortfall — and releases
//! the buffer back to the hardware. Underflow is therefore audible as a
//! brief gap, never as a stall or uninitialized playback.
//!
//! Symmetric to `WasapiCapture`: dedicated MMCSS thread, synchronous setup
//! handshake in `start`, fault classification onto the session latch.

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

/// How long `start` waits for the stream thread to finish WASAPI setup.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Render endpoint bound at construction to one device, one ring buffer,
/// and one fault latch.
pub struct WasapiRender {
    spec: EndpointSpec,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WasapiRender {
    pub fn new(spec: EndpointSpec) -> Self {
        Self {
            spec,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Endpoint for WasapiRender {
    fn start(&mut self) -> Result<(), DuplexError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(DuplexError::InvalidState(
                "render endpoint already running".into(),
            ));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let spec = self.spec.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("wasapi-render".into())
            .spawn(move || {
                render_thread(spec, &running, ready_tx);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DuplexError::Backend(format!("failed to spawn render thread: {e}")))?;

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
                    "timed out waiting for render stream setup".into(),
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

impl Drop for WasapiRender {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderStream {
    _com: ComGuard,
    audio_client: IAudioClient,
    render_client: IAudioRenderClient,
    buffer_frames: u32,
    block_align: usize,
}

fn render_thread(spec: EndpointSpec, running: &AtomicBool, ready_tx: SyncSender<Result<(), DuplexError>>) {
    let stream = match open_stream(&spec) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    render_loop(&stream, &spec, running);

    unsafe {
        let _ = stream.audio_client.Stop();
    }
    log::debug!("render stream on {} exited", spec.device_id);
}

/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Look the device up by id
/// 3. Activate IAudioClient, verify the mix format still matches the session
/// 4. Initialize shared mode
/// 5. Get IAudioRenderClient, register with MMCSS
/// 6. Prime one full device buffer with silence, then Start
fn open_stream(spec: &EndpointSpec) -> Result<RenderStream, DuplexError> {
    unsafe {
        let com = ComGuard::init()?;
        let enumerator = com::create_enumerator()?;
        let device = com::device_by_id(&enumerator, &spec.device_id)?;

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| com::classify_open_error("Activate", &e))?;

        let mix = MixFormat::query(&audio_client)?;
        if mix.format() != spec.format {
            return Err(DuplexError::FormatMismatch(format!(
                "device streams {}, session negotiated {}",
                mix.format(),
                spec.format
            )));
        }

        let buffer_duration = com::to_reference_time(spec.period * 2);
        audio_client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_NOPERSIST,
                buffer_duration,
                0,
                mix.as_raw(),
                None,
            )
            .map_err(|e| com::classify_open_error("IAudioClient::Initialize", &e))?;

        let render_client: IAudioRenderClient = audio_client
            .GetService()
            .map_err(|e| com::classify_open_error("GetService", &e))?;

        let buffer_frames = audio_client
            .GetBufferSize()
            .map_err(|e| com::classify_open_error("GetBufferSize", &e))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle =
            AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        // Prime the device buffer with silence so playback starts clean
        // while the capture side is still spinning up.
        let data = render_client
            .GetBuffer(buffer_frames)
            .map_err(|e| com::classify_open_error("GetBuffer (prime)", &e))?;
        let byte_len = buffer_frames as usize * mix.block_align();
        std::slice::from_raw_parts_mut(data, byte_len).fill(0);
        render_client
            .ReleaseBuffer(buffer_frames, 0)
            .map_err(|e| com::classify_open_error("ReleaseBuffer (prime)", &e))?;

        audio_client
            .Start()
            .map_err(|e| com::classify_open_error("IAudioClient::Start", &e))?;

        let block_align = mix.block_align();
        Ok(RenderStream {
            _com: com,
            audio_client,
            render_client,
            buffer_frames,
            block_align,
        })
    }
}

/// Hot loop: top the device buffer up every half period.
fn render_loop(stream: &RenderStream, spec: &EndpointSpec, running: &AtomicBool) {
    let poll = (spec.period / 2)
        .max(Duration::from_millis(1))
        .min(Duration::from_millis(10));

    while running.load(Ordering::SeqCst) {
        thread::sleep(poll);

        if let Err(e) = fill_device_buffer(stream, spec) {
            if running.load(Ordering::SeqCst) {
                spec.faults.raise(e);
            }
            break;
        }
    }
}

fn fill_device_buffer(stream: &RenderStream, spec: &EndpointSpec) -> Result<(), FaultReason> {
    unsafe {
        let padding = stream
            .audio_client
            .GetCurrentPadding()
            .map_err(|e| com::classify_stream_fault("GetCurrentPadding", &e))?;

        let frames = stream.buffer_frames.saturating_sub(padding);
        if frames == 0 {
            return Ok(());
        }

        let data = stream
            .render_client
            .GetBuffer(frames)
            .map_err(|e| com::classify_stream_fault("GetBuffer", &e))?;

        let byte_len = frames as usize * stream.block_align;
        let out = std::slice::from_raw_parts_mut(data, byte_len);
        // Held bytes first, zeros for the rest; underflow is counted by the
        // ring and never escalated from here.
        spec.buffer.lock().fill_or_silence(out);

        stream
            .render_client
            .ReleaseBuffer(frames, 0)
            .map_err(|e| com::classify_stream_fault("ReleaseBuffer", &e))?;
    }
    Ok(())
}
