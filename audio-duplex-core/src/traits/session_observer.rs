use crate::models::error::FaultReason;
use crate::models::state::SessionState;

/// Event delegate for session notifications.
///
/// All methods are called from control-owned threads (the caller's thread for
/// start/stop transitions, the fault supervisor thread for faults) — never
/// from a real-time stream callback. Implementations should marshal to the
/// UI thread if needed.
pub trait SessionObserver: Send + Sync {
    /// Called on every session state transition.
    fn on_state_changed(&self, state: &SessionState);

    /// Called after a fault has been handled: both endpoints are already
    /// stopped by the time this fires.
    fn on_fault(&self, reason: &FaultReason);
}
