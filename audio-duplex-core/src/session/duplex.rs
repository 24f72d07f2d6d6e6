use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::SessionConfig;
use crate::models::error::{DuplexError, FaultReason};
use crate::models::state::SessionState;
use crate::processing::ring_buffer::{BufferStats, RingBuffer, SharedRingBuffer};
use crate::session::fault::FaultLatch;
use crate::traits::audio_backend::{AudioBackend, EndpointSpec};
use crate::traits::endpoint::Endpoint;
use crate::traits::session_observer::SessionObserver;

/// How often the supervisor thread checks the fault latch.
const FAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Both endpoints of an active session, shared with the fault supervisor so
/// either side can run the ordered stop sequence.
#[derive(Default)]
struct EndpointPair {
    capture: Option<Box<dyn Endpoint>>,
    render: Option<Box<dyn Endpoint>>,
}

impl EndpointPair {
    /// Ordered stop: producer silenced before the consumer is torn down, so
    /// nothing writes into a buffer whose reader is gone. Idempotent.
    fn stop_ordered(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut render) = self.render.take() {
            render.stop();
        }
    }
}

/// One source→destination duplication: a capture endpoint and a render
/// endpoint decoupled by a ring buffer sized for the configured latency
/// preset.
///
/// Created per device pair; re-binding devices is stop-then-reconstruct,
/// never a live swap. After a fault the session stays in `Error` until
/// `reset()` — it does not silently retry.
///
/// ```text
/// [Capture] → [RingBuffer] → [Render]
///     │                          │
///     └──── FaultLatch ──────────┘
///               │
///        supervisor thread
/// ```
pub struct DuplexSession {
    backend: Arc<dyn AudioBackend>,
    config: SessionConfig,
    observer: Option<Arc<dyn SessionObserver>>,

    state: Arc<Mutex<SessionState>>,
    endpoints: Arc<Mutex<EndpointPair>>,
    buffer: Option<SharedRingBuffer>,
    faults: Arc<FaultLatch>,

    supervisor_running: Arc<AtomicBool>,
    supervisor_handle: Option<thread::JoinHandle<()>>,
}

impl DuplexSession {
    pub fn new(backend: Arc<dyn AudioBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            observer: None,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            endpoints: Arc::new(Mutex::new(EndpointPair::default())),
            buffer: None,
            faults: Arc::new(FaultLatch::new()),
            supervisor_running: Arc::new(AtomicBool::new(false)),
            supervisor_handle: None,
        }
    }

    /// Register the state/fault delegate. Call before `start`.
    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    pub fn status(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transfer counters of the ring buffer backing a started session.
    /// `None` once the session is stopped; sample before `stop()` if the
    /// final counters matter.
    pub fn buffer_stats(&self) -> Option<BufferStats> {
        self.buffer.as_ref().map(|b| b.lock().stats())
    }

    /// Start duplication. Valid only from `Idle`.
    ///
    /// The render endpoint starts before the capture endpoint so the consumer
    /// is draining before the producer emits; an initial underflow burst is
    /// expected and harmless, an overflow burst would cost captured audio.
    ///
    /// Synchronous failures roll the session back to `Idle` with whichever
    /// endpoint did start stopped again; no partial state survives.
    pub fn start(&mut self) -> Result<(), DuplexError> {
        {
            let state = self.state.lock();
            if !state.is_idle() {
                return Err(DuplexError::InvalidState(format!(
                    "can only start from idle state (currently {state:?})"
                )));
            }
        }
        self.config.validate()?;

        self.set_state(SessionState::Starting);
        match self.start_streams() {
            Ok(()) => {
                self.set_state(SessionState::Active);
                self.spawn_supervisor();
                log::debug!(
                    "session active: {} -> {}",
                    self.config.source_id,
                    self.config.destination_id
                );
                Ok(())
            }
            Err(e) => {
                self.endpoints.lock().stop_ordered();
                self.buffer = None;
                self.faults.reset();
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Stop duplication: capture first, then render. Idempotent; a no-op
    /// from `Idle`. From `Error` it only releases resources — the fault
    /// record stays until `reset()`.
    pub fn stop(&mut self) {
        let was_active = {
            let state = self.state.lock();
            if state.is_idle() {
                return;
            }
            state.is_active()
        };

        if was_active {
            self.set_state(SessionState::Stopping);
        }

        self.join_supervisor();
        self.endpoints.lock().stop_ordered();
        self.buffer = None;

        // A fault may have landed between the state check and the teardown;
        // honor it rather than reporting a clean stop.
        if let Some(reason) = self.faults.take() {
            self.notify_fault(reason);
            return;
        }

        if was_active || self.status() == SessionState::Stopping {
            self.set_state(SessionState::Idle);
        }
    }

    /// Re-arm a faulted session. Valid from `Error` (or `Idle`, as a no-op);
    /// an active session must be stopped first.
    pub fn reset(&mut self) -> Result<(), DuplexError> {
        let state = self.status();
        match state {
            SessionState::Idle => Ok(()),
            SessionState::Error(_) => {
                self.faults.reset();
                self.set_state(SessionState::Idle);
                Ok(())
            }
            _ => Err(DuplexError::InvalidState(format!(
                "can only reset from error state (currently {state:?})"
            ))),
        }
    }

    // --- Internal helpers ---

    /// Probe formats, size the buffer, construct and start both endpoints.
    /// On error the caller owns rollback; anything this method started is
    /// stopped again before returning the error.
    fn start_streams(&mut self) -> Result<(), DuplexError> {
        let source_format = self.backend.device_format(&self.config.source_id)?;
        let dest_format = self.backend.device_format(&self.config.destination_id)?;
        if !source_format.is_valid() {
            return Err(DuplexError::DeviceUnavailable(format!(
                "{} reports unusable format {source_format}",
                self.config.source_id
            )));
        }
        if !dest_format.is_valid() {
            return Err(DuplexError::DeviceUnavailable(format!(
                "{} reports unusable format {dest_format}",
                self.config.destination_id
            )));
        }
        if source_format != dest_format {
            // No resampling path exists in this core, so a mismatch is a
            // start-time precondition failure, not a runtime fault.
            return Err(DuplexError::FormatMismatch(format!(
                "source is {source_format}, destination is {dest_format}"
            )));
        }

        let capacity = dest_format
            .bytes_for_duration(self.config.latency.buffer_duration())
            .max(dest_format.bytes_per_frame());
        let buffer = RingBuffer::shared(capacity);
        self.faults.reset();

        let period = self.config.latency.stream_period();
        let render_spec = EndpointSpec {
            device_id: self.config.destination_id.clone(),
            format: dest_format,
            buffer: Arc::clone(&buffer),
            faults: Arc::clone(&self.faults),
            period,
        };
        let capture_spec = EndpointSpec {
            device_id: self.config.source_id.clone(),
            format: source_format,
            buffer: Arc::clone(&buffer),
            faults: Arc::clone(&self.faults),
            period,
        };

        let mut render = self.backend.open_render(render_spec)?;
        let mut capture = self.backend.open_capture(capture_spec)?;

        render.start()?;
        if let Err(e) = capture.start() {
            render.stop();
            return Err(e);
        }

        let mut pair = self.endpoints.lock();
        pair.render = Some(render);
        pair.capture = Some(capture);
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Spawn the control-owned thread that polls the fault latch and, on
    /// fault, runs the ordered stop and surfaces the classified reason.
    /// Stream threads only ever touch the latch; they never call observers.
    fn spawn_supervisor(&mut self) {
        self.supervisor_running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.supervisor_running);
        let faults = Arc::clone(&self.faults);
        let endpoints = Arc::clone(&self.endpoints);
        let state = Arc::clone(&self.state);
        let observer = self.observer.clone();

        let handle = thread::Builder::new()
            .name("duplex-supervisor".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(FAULT_POLL_INTERVAL);

                    let Some(reason) = faults.take() else {
                        continue;
                    };

                    log::warn!("stream fault: {reason}; stopping session");
                    endpoints.lock().stop_ordered();

                    let new_state = SessionState::Error(reason.clone());
                    *state.lock() = new_state.clone();
                    if let Some(ref obs) = observer {
                        obs.on_state_changed(&new_state);
                        obs.on_fault(&reason);
                    }
                    break;
                }
            })
            .expect("failed to spawn supervisor thread");

        self.supervisor_handle = Some(handle);
    }

    fn join_supervisor(&mut self) {
        self.supervisor_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.supervisor_handle.take() {
            let _ = handle.join();
        }
    }

    fn set_state(&self, new_state: SessionState) {
        *self.state.lock() = new_state.clone();
        if let Some(ref observer) = self.observer {
            observer.on_state_changed(&new_state);
        }
    }

    fn notify_fault(&self, reason: FaultReason) {
        let new_state = SessionState::Error(reason.clone());
        *self.state.lock() = new_state.clone();
        if let Some(ref observer) = self.observer {
            observer.on_state_changed(&new_state);
            observer.on_fault(&reason);
        }
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        self.join_supervisor();
        self.endpoints.lock().stop_ordered();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::mock::{MockBackend, MockObserver};
    use crate::models::config::LatencyPreset;
    use crate::models::format::AudioFormat;

    fn backend_with_pair() -> Arc<MockBackend> {
        let backend = Arc::new(MockBackend::new());
        backend.add_render_device("spk");
        backend.add_capture_device("mic");
        backend
    }

    fn session(backend: &Arc<MockBackend>) -> DuplexSession {
        let config = SessionConfig::new("mic", "spk").with_latency(LatencyPreset::Balanced);
        DuplexSession::new(backend.clone() as Arc<dyn AudioBackend>, config)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn start_requires_device_ids() {
        let backend = backend_with_pair();
        let mut session = DuplexSession::new(
            backend as Arc<dyn AudioBackend>,
            SessionConfig::new("X", ""),
        );

        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::InvalidConfiguration(_)));
        assert_eq!(session.status(), SessionState::Idle);
    }

    #[test]
    fn render_starts_before_capture_and_stops_after() {
        let backend = backend_with_pair();
        let mut session = session(&backend);

        session.start().unwrap();
        assert!(session.status().is_active());
        session.stop();
        assert_eq!(session.status(), SessionState::Idle);

        let events = backend.events();
        let pos = |needle: &str| {
            events
                .iter()
                .position(|e| e == needle)
                .unwrap_or_else(|| panic!("missing event {needle} in {events:?}"))
        };
        assert!(pos("start:render:spk") < pos("start:capture:mic"));
        assert!(pos("stop:capture:mic") < pos("stop:render:spk"));
    }

    #[test]
    fn stop_is_idempotent() {
        let backend = backend_with_pair();
        let mut session = session(&backend);

        // Stopping a never-started session is a no-op.
        session.stop();
        assert_eq!(session.status(), SessionState::Idle);

        session.start().unwrap();
        session.stop();
        session.stop();

        let events = backend.events();
        let stops = events.iter().filter(|e| e.starts_with("stop:")).count();
        assert_eq!(stops, 2, "one stop per endpoint, no double teardown: {events:?}");
    }

    #[test]
    fn start_twice_is_rejected() {
        let backend = backend_with_pair();
        let mut session = session(&backend);

        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::InvalidState(_)));
        assert!(session.status().is_active());

        // Reset is likewise a state violation while running.
        assert!(matches!(
            session.reset().unwrap_err(),
            DuplexError::InvalidState(_)
        ));
        session.stop();
    }

    #[test]
    fn format_mismatch_fails_start() {
        let backend = backend_with_pair();
        backend.set_format(
            "spk",
            AudioFormat {
                sample_rate: 44_100,
                channels: 2,
                bits_per_sample: 32,
            },
        );
        let mut session = session(&backend);

        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::FormatMismatch(_)));
        assert_eq!(session.status(), SessionState::Idle);
    }

    #[test]
    fn degenerate_device_format_fails_start() {
        let backend = backend_with_pair();
        let zero_channels = AudioFormat {
            sample_rate: 48_000,
            channels: 0,
            bits_per_sample: 32,
        };
        backend.set_format("mic", zero_channels);
        backend.set_format("spk", zero_channels);
        let mut session = session(&backend);

        // A zero-channel format would size the ring buffer at zero bytes;
        // it must surface as a start error, never reach buffer construction.
        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::DeviceUnavailable(_)));
        assert_eq!(session.status(), SessionState::Idle);
        assert!(backend.events().iter().all(|e| !e.starts_with("open:")));
    }

    #[test]
    fn missing_device_fails_start_without_partial_state() {
        let backend = Arc::new(MockBackend::new());
        backend.add_capture_device("mic");
        // No render device registered at all.
        let mut session = DuplexSession::new(
            backend.clone() as Arc<dyn AudioBackend>,
            SessionConfig::new("mic", "spk"),
        );

        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::DeviceUnavailable(_)));
        assert_eq!(session.status(), SessionState::Idle);
        assert!(backend.events().iter().all(|e| !e.starts_with("start:")));
    }

    #[test]
    fn capture_start_failure_rolls_back_render() {
        let backend = backend_with_pair();
        backend.fail_start("mic");
        let mut session = session(&backend);

        let err = session.start().unwrap_err();
        assert!(matches!(err, DuplexError::DeviceUnavailable(_)));
        assert_eq!(session.status(), SessionState::Idle);

        let events = backend.events();
        assert!(events.contains(&"start:render:spk".to_string()));
        assert!(events.contains(&"stop:render:spk".to_string()));
        assert!(!events.contains(&"start:capture:mic".to_string()));
    }

    #[test]
    fn fault_stops_both_endpoints_and_reports_error() {
        let backend = backend_with_pair();
        let mut session = session(&backend);
        let observer = Arc::new(MockObserver::default());
        session.set_observer(observer.clone());

        session.start().unwrap();
        backend.inject_fault(FaultReason::DeviceRemoved);

        assert!(wait_until(|| {
            session.status().is_error() && !observer.faults().is_empty()
        }));
        assert_eq!(
            session.status().fault(),
            Some(&FaultReason::DeviceRemoved)
        );

        // Neither endpoint may stay running once the other has faulted.
        let events = backend.events();
        assert!(events.contains(&"stop:capture:mic".to_string()));
        assert!(events.contains(&"stop:render:spk".to_string()));
        assert_eq!(observer.faults(), vec![FaultReason::DeviceRemoved]);
    }

    #[test]
    fn faulted_session_requires_reset_before_restart() {
        let backend = backend_with_pair();
        let mut session = session(&backend);

        session.start().unwrap();
        backend.inject_fault(FaultReason::Stream("glitch".into()));
        assert!(wait_until(|| session.status().is_error()));

        assert!(session.start().is_err());
        session.stop();
        session.reset().unwrap();
        assert_eq!(session.status(), SessionState::Idle);
        session.start().unwrap();
        assert!(session.status().is_active());
        session.stop();
    }

    #[test]
    fn observer_sees_lifecycle_transitions() {
        let backend = backend_with_pair();
        let mut session = session(&backend);
        let observer = Arc::new(MockObserver::default());
        session.set_observer(observer.clone());

        session.start().unwrap();
        session.stop();

        let states = observer.states();
        assert_eq!(
            states,
            vec![
                SessionState::Starting,
                SessionState::Active,
                SessionState::Stopping,
                SessionState::Idle,
            ]
        );
    }

    #[test]
    fn buffer_sized_from_preset_and_format() {
        let backend = backend_with_pair();
        let mut session = session(&backend);
        session.start().unwrap();

        // Balanced preset: 100ms of 48kHz stereo f32 = 38400 bytes.
        let buffer = session.buffer.as_ref().unwrap();
        assert_eq!(buffer.lock().capacity(), 38_400);
        session.stop();
        assert!(session.buffer_stats().is_none());
    }
}
