use std::fmt;

use serde::{Deserialize, Serialize};

/// Controller-level summary consumed by the render layer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No request is in flight.
    #[default]
    Idle,

    /// A request is in flight; the assistant message is streaming.
    Loading,

    /// The last request failed.  Cleared by the next submit.
    Error,
}

impl SessionStatus {
    /// Mirrors the `isLoading` flag render layers usually key their affordances on.
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionStatus::Loading)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Loading => write!(f, "loading"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}
