//! Per-session completion state.

use serde::{Deserialize, Serialize};

/// Where a payment session stands with respect to order completion.
///
/// State transitions:
/// ```text
/// Unseen ──► Processing ──► Completed
/// ```
/// `Processing` is transient and only visible inside the process running
/// the completion. `Completed` is backed by the stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No order exists and no completion is running.
    #[default]
    Unseen,

    /// A completion is running in this process.
    Processing,

    /// An order exists for the session (terminal state).
    Completed,
}

impl SessionState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unseen => "unseen",
            SessionState::Processing => "processing",
            SessionState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
