//! Connection state automaton.
//!
//! `Closed → Connecting → Open → (Closed | Connecting)`.

use serde::{Deserialize, Serialize};

/// State of the connection to the selected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Requests may be sent.
    Open,
}

impl ConnectionState {
    /// Whether requests can be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Get valid transitions from current state.
    pub fn valid_transitions(&self) -> &'static [ConnectionState] {
        match self {
            Self::Closed => &[Self::Connecting],
            Self::Connecting => &[Self::Open, Self::Closed],
            Self::Open => &[Self::Closed, Self::Connecting],
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

/// Events that drive connection state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt started (first attempt or retry).
    Dial,
    /// Handshake completed.
    Connected,
    /// Attempt failed or an open connection dropped.
    Dropped(String),
    /// Reconnecting straight from an open connection.
    Retry,
    /// The user deselected the peer or the client shut down.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_transitions() {
        assert!(ConnectionState::Closed.can_transition_to(ConnectionState::Connecting));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Open));

        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Open));
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Closed));

        assert!(ConnectionState::Open.can_transition_to(ConnectionState::Connecting));
        assert!(ConnectionState::Open.can_transition_to(ConnectionState::Closed));
    }

    #[test]
    fn only_open_sends() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Closed.is_open());
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"CONNECTING\""
        );
    }
}
