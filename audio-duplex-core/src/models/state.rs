use serde::{Deserialize, Serialize};

use super::error::FaultReason;

/// Duplication session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → active → stopping → idle
///           │          │
///           └──────────┴──→ error(reason) ──(reset)──→ idle
/// ```
///
/// `Active` holds only while both endpoints are started; any fault tears both
/// endpoints down before `Error` becomes observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Error(FaultReason),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The fault that moved the session to `Error`, if any.
    pub fn fault(&self) -> Option<&FaultReason> {
        match self {
            Self::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}
