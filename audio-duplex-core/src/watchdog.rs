//! Device presence polling.
//!
//! Drives automatic retry policies owned elsewhere: the watchdog only
//! reports connect/disconnect edges for one device identity, it never
//! touches a session itself. Polling is fine here — this path is not
//! real-time, unlike the capture/render callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::traits::audio_backend::AudioBackend;

/// Edge-triggered presence transition for the watched device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected,
    Disconnected,
}

/// Callback invoked on each presence transition, from the watchdog thread.
pub type DeviceEventCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync + 'static>;

/// Polls the backend's device enumeration for one device id and raises
/// `Connected`/`Disconnected` on transitions only, never on every poll.
///
/// The first successful poll establishes the baseline and emits nothing.
/// Enumeration errors are skipped (logged, no observation) rather than
/// misread as a disconnect.
pub struct DeviceWatchdog {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DeviceWatchdog {
    /// Start watching `device_id`, probing every `interval`.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        device_id: impl Into<String>,
        interval: Duration,
        callback: DeviceEventCallback,
    ) -> Self {
        let device_id = device_id.into();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("device-watchdog".into())
            .spawn(move || {
                let mut last_present: Option<bool> = None;

                while thread_running.load(Ordering::SeqCst) {
                    match backend.device_exists(&device_id) {
                        Ok(present) => {
                            if let Some(prev) = last_present {
                                if prev != present {
                                    let event = if present {
                                        DeviceEvent::Connected
                                    } else {
                                        DeviceEvent::Disconnected
                                    };
                                    log::debug!("device {device_id}: {event:?}");
                                    callback(event);
                                }
                            }
                            last_present = Some(present);
                        }
                        Err(e) => {
                            // Transient enumeration failure is not evidence
                            // the device left; wait for the next poll.
                            log::warn!("device probe failed for {device_id}: {e}");
                        }
                    }

                    sleep_interruptibly(&thread_running, interval);
                }
            })
            .expect("failed to spawn watchdog thread");

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop polling. Synchronous: the poll thread has exited on return.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `interval` in small slices so `stop` stays responsive even
/// with multi-second polling intervals.
fn sleep_interruptibly(running: &AtomicBool, interval: Duration) {
    const SLICE: Duration = Duration::from_millis(20);
    let mut remaining = interval;
    while running.load(Ordering::SeqCst) && !remaining.is_zero() {
        let step = remaining.min(SLICE);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use parking_lot::Mutex;

    use super::*;
    use crate::mock::MockBackend;

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

    fn collecting_watchdog(
        backend: &Arc<MockBackend>,
    ) -> (DeviceWatchdog, Arc<Mutex<Vec<DeviceEvent>>>) {
        let events: Arc<Mutex<Vec<DeviceEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let watchdog = DeviceWatchdog::spawn(
            backend.clone() as Arc<dyn AudioBackend>,
            "spk",
            Duration::from_millis(10),
            Arc::new(move |e| sink.lock().push(e)),
        );
        (watchdog, events)
    }

    #[test]
    fn no_event_on_steady_state() {
        let backend = Arc::new(MockBackend::new());
        backend.add_render_device("spk");
        let (mut watchdog, events) = collecting_watchdog(&backend);

        thread::sleep(Duration::from_millis(80));
        watchdog.stop();
        assert!(events.lock().is_empty());
    }

    #[test]
    fn disconnect_and_reconnect_are_edge_triggered() {
        let backend = Arc::new(MockBackend::new());
        backend.add_render_device("spk");
        let (mut watchdog, events) = collecting_watchdog(&backend);

        // Let the baseline poll land before churning the device.
        thread::sleep(Duration::from_millis(40));
        backend.remove_device("spk");
        assert!(wait_until(|| events.lock().len() == 1));

        backend.add_render_device("spk");
        assert!(wait_until(|| events.lock().len() == 2));

        // Steady presence afterwards adds nothing.
        thread::sleep(Duration::from_millis(60));
        watchdog.stop();

        assert_eq!(
            events.lock().clone(),
            vec![DeviceEvent::Disconnected, DeviceEvent::Connected]
        );
    }

    #[test]
    fn stop_joins_promptly_despite_long_interval() {
        let backend = Arc::new(MockBackend::new());
        backend.add_render_device("spk");
        let events: Arc<Mutex<Vec<DeviceEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut watchdog = DeviceWatchdog::spawn(
            backend as Arc<dyn AudioBackend>,
            "spk",
            Duration::from_secs(30),
            Arc::new(move |e| sink.lock().push(e)),
        );

        let begun = Instant::now();
        watchdog.stop();
        assert!(begun.elapsed() < Duration::from_secs(2));
    }
}
