use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one negotiation attempt as reported to the host
///
/// ```text
/// New -> Describing -> Negotiating -> Connected
///   \________\______________\____________\____> Disconnected | Failed | Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    New,
    /// Local description is being created and candidates gathered
    Describing,
    /// Waiting on the signaling exchange and remote description
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::Disconnected | ControllerState::Failed | ControllerState::Closed
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ControllerState::Connected)
    }

    /// Terminal states that end the session with a connection failure
    pub fn is_failure(&self) -> bool {
        matches!(self, ControllerState::Disconnected | ControllerState::Failed)
    }

    pub fn can_transition_to(&self, next: ControllerState) -> bool {
        use ControllerState::*;

        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }
        matches!(
            (self, next),
            (New, Describing) | (Describing, Negotiating) | (Negotiating, Connected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::New => "new",
            ControllerState::Describing => "describing",
            ControllerState::Negotiating => "negotiating",
            ControllerState::Connected => "connected",
            ControllerState::Disconnected => "disconnected",
            ControllerState::Failed => "failed",
            ControllerState::Closed => "closed",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ControllerState,
    pub to: ControllerState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControllerState::*;

    #[test]
    fn test_forward_path() {
        assert!(New.can_transition_to(Describing));
        assert!(Describing.can_transition_to(Negotiating));
        assert!(Negotiating.can_transition_to(Connected));
        assert!(!New.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connected));
        assert!(!Negotiating.can_transition_to(Describing));
    }

    #[test]
    fn test_terminal_states_absorb() {
        for state in [New, Describing, Negotiating, Connected] {
            assert!(state.can_transition_to(Closed));
            assert!(state.can_transition_to(Failed));
        }
        for terminal in [Disconnected, Failed, Closed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Closed));
            assert!(!terminal.can_transition_to(Describing));
        }
        assert!(Failed.is_failure());
        assert!(!Closed.is_failure());
    }
}
