//! Session lifecycle states

use serde::{Deserialize, Serialize};

/// Binding state of one thread key.
///
/// `Unbound -> Connecting -> Bound -> Unbound`. A thread id that was torn
/// down stays `Unbound` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionState {
    Unbound,
    Connecting,
    Bound,
}

impl SessionState {
    /// Whether `next` is a legal transition from `self`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Unbound, SessionState::Connecting)
                | (SessionState::Connecting, SessionState::Bound)
                | (SessionState::Connecting, SessionState::Unbound)
                | (SessionState::Bound, SessionState::Unbound)
        )
    }
}
