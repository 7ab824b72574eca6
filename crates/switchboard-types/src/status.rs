// Status codes carried by the event envelope.
//
// Wire mapping: no code while in progress, 0 for success, a negative code for
// failure, and the reserved code 102 ("processing") for a suspended pending
// invocation awaiting an external signal.

use serde::{Deserialize, Serialize};

/// Reserved wire code marking a pending (suspended) invocation
pub const PENDING_CODE: i32 = 102;

/// Terminal and non-terminal status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Dispatch has not reached a terminal state yet
    InProgress,
    /// Terminal: final data is present
    Success,
    /// Non-terminal: suspended, awaiting an external signal
    Pending,
    /// Terminal: failed with a negative code
    Failed(i32),
}

impl StatusCode {
    /// The wire-level code, if one has been assigned
    pub fn code(&self) -> Option<i32> {
        match self {
            StatusCode::InProgress => None,
            StatusCode::Success => Some(0),
            StatusCode::Pending => Some(PENDING_CODE),
            StatusCode::Failed(code) => Some(*code),
        }
    }

    /// Build a status from a wire-level code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatusCode::Success,
            PENDING_CODE => StatusCode::Pending,
            other => StatusCode::Failed(other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StatusCode::Pending)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_mapping() {
        assert_eq!(StatusCode::InProgress.code(), None);
        assert_eq!(StatusCode::Success.code(), Some(0));
        assert_eq!(StatusCode::Pending.code(), Some(PENDING_CODE));
        assert_eq!(StatusCode::Failed(-32).code(), Some(-32));
    }

    #[test]
    fn test_from_code() {
        assert_eq!(StatusCode::from_code(0), StatusCode::Success);
        assert_eq!(StatusCode::from_code(102), StatusCode::Pending);
        assert_eq!(StatusCode::from_code(-1), StatusCode::Failed(-1));
    }

    #[test]
    fn test_terminality() {
        assert!(StatusCode::Success.is_terminal());
        assert!(StatusCode::Failed(-1).is_terminal());
        assert!(!StatusCode::Pending.is_terminal());
        assert!(StatusCode::Pending.is_pending());
        assert!(!StatusCode::InProgress.is_terminal());
    }
}
