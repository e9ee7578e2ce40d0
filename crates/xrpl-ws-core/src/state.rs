//! Connection State Machine
//!
//! The lifecycle of the single client connection. Only the transitions listed
//! in [`ConnectionState::can_transition_to`] are legal; in particular a client
//! can never go from `Disconnected` straight to `Connected`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of the client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No background task is running
    #[default]
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Transport is open and messages flow
    Connected,
    /// Waiting out the reconnect interval before the next attempt
    Reconnecting,
    /// Deliberate shutdown in progress
    Disconnecting,
}

impl ConnectionState {
    /// Get the state name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Disconnecting => "Disconnecting",
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connecting, Disconnecting)
                | (Connected, Reconnecting)
                | (Connected, Disconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }

    /// Consume the current state and produce the next one
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, StateTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateTransitionError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Whether requests can be written in this state
    pub fn can_send_messages(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ----------------------------------------------------------------------------
// State Transition Errors
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), Disconnected);
    }

    #[test]
    fn test_disconnected_cannot_jump_to_connected() {
        let err = Disconnected.transition(Connected).unwrap_err();
        assert_eq!(
            err,
            StateTransitionError::InvalidTransition {
                from: Disconnected,
                to: Connected
            }
        );

        let state = Disconnected.transition(Connecting).unwrap();
        assert_eq!(state.transition(Connected).unwrap(), Connected);
    }

    #[test]
    fn test_reconnect_cycle() {
        let state = Disconnected
            .transition(Connecting)
            .and_then(|s| s.transition(Connected))
            .and_then(|s| s.transition(Reconnecting))
            .and_then(|s| s.transition(Connecting))
            .and_then(|s| s.transition(Reconnecting))
            .and_then(|s| s.transition(Disconnecting))
            .and_then(|s| s.transition(Disconnected))
            .unwrap();

        assert_eq!(state, Disconnected);
    }

    #[test]
    fn test_shutdown_only_ends_in_disconnected() {
        assert!(Disconnecting.can_transition_to(Disconnected));
        assert!(!Disconnecting.can_transition_to(Connecting));
        assert!(!Disconnecting.can_transition_to(Reconnecting));
        assert!(!Connected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_only_connected_can_send() {
        assert!(Connected.can_send_messages());
        for state in [Disconnected, Connecting, Reconnecting, Disconnecting] {
            assert!(!state.can_send_messages());
        }
    }
}
