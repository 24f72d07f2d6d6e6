use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::models::error::FaultReason;

/// Non-blocking handoff of stream-thread faults to the control thread.
///
/// Stream callbacks must never call out into arbitrary handler code or block
/// on a contended lock. `raise` sets an atomic flag and records the reason
/// with `try_lock`; the supervisor thread polls `take` and runs the actual
/// fault handling on its own schedule.
///
/// First fault wins: later faults from the surviving endpoint during teardown
/// are dropped, which is fine — the session is coming down either way.
#[derive(Debug, Default)]
pub struct FaultLatch {
    raised: AtomicBool,
    reason: Mutex<Option<FaultReason>>,
}

impl FaultLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault. Safe from a real-time thread: no blocking, no
    /// allocation beyond the reason already constructed by the caller.
    pub fn raise(&self, reason: FaultReason) {
        if self.raised.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut slot) = self.reason.try_lock() {
            *slot = Some(reason);
        }
        // If try_lock failed the supervisor is mid-take; the flag alone is
        // enough for it to report a generic stream fault.
    }

    /// Whether a fault is pending. Cheap enough to poll.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Consume the pending fault, if any. Called from control threads only;
    /// a second `take` with no new `raise` in between returns `None`.
    pub fn take(&self) -> Option<FaultReason> {
        if !self.raised.swap(false, Ordering::AcqRel) {
            return None;
        }
        let reason = self.reason.lock().take();
        Some(reason.unwrap_or_else(|| FaultReason::Stream("unrecorded stream fault".into())))
    }

    /// Re-arm the latch for a fresh start cycle.
    pub fn reset(&self) {
        *self.reason.lock() = None;
        self.raised.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_then_take() {
        let latch = FaultLatch::new();
        assert!(!latch.is_raised());
        assert!(latch.take().is_none());

        latch.raise(FaultReason::DeviceRemoved);
        assert!(latch.is_raised());
        assert_eq!(latch.take(), Some(FaultReason::DeviceRemoved));
        assert_eq!(latch.take(), None, "take consumes the fault");
    }

    #[test]
    fn first_fault_wins() {
        let latch = FaultLatch::new();
        latch.raise(FaultReason::DeviceRemoved);
        latch.raise(FaultReason::Stream("second".into()));
        assert_eq!(latch.take(), Some(FaultReason::DeviceRemoved));
    }

    #[test]
    fn reset_rearms() {
        let latch = FaultLatch::new();
        latch.raise(FaultReason::FormatChanged);
        latch.reset();
        assert!(!latch.is_raised());
        latch.raise(FaultReason::Stream("after reset".into()));
        assert_eq!(latch.take(), Some(FaultReason::Stream("after reset".into())));
    }
}
