//! Connection state machine for the focalpoint client.

use tokio::sync::watch;

use focalpoint_core::{ConnectionEvent, ConnectionState, FocalError, FocalResult};

/// Tracks the connection state and publishes every change.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateMachine {
    /// Create a new state machine in `Closed`.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            state: ConnectionState::Closed,
            tx,
        }
    }

    /// Get current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Apply an event and publish the resulting state.
    pub fn transition(&mut self, event: ConnectionEvent) -> FocalResult<ConnectionState> {
        let new_state = match (&self.state, &event) {
            (ConnectionState::Closed, ConnectionEvent::Dial) => ConnectionState::Connecting,
            (ConnectionState::Connecting, ConnectionEvent::Connected) => ConnectionState::Open,
            (ConnectionState::Connecting, ConnectionEvent::Dropped(_)) => ConnectionState::Closed,
            (ConnectionState::Open, ConnectionEvent::Dropped(_)) => ConnectionState::Closed,
            (ConnectionState::Open, ConnectionEvent::Retry) => ConnectionState::Connecting,
            (_, ConnectionEvent::Closed) => ConnectionState::Closed,
            _ => {
                return Err(FocalError::Protocol(format!(
                    "Invalid transition from {:?} on {:?}",
                    self.state, event
                )));
            }
        };

        if new_state == self.state {
            return Ok(new_state);
        }
        if self.state.can_transition_to(new_state) {
            tracing::debug!("Connection state: {:?} -> {:?}", self.state, new_state);
            self.state = new_state;
            self.tx.send_replace(new_state);
            Ok(new_state)
        } else {
            Err(FocalError::Protocol(format!(
                "Invalid state transition: {:?} -> {:?}",
                self.state, new_state
            )))
        }
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_flow() {
        let mut sm = ConnectionStateMachine::new();
        let rx = sm.subscribe();
        assert_eq!(sm.state(), ConnectionState::Closed);

        sm.transition(ConnectionEvent::Dial).unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);

        sm.transition(ConnectionEvent::Connected).unwrap();
        assert_eq!(sm.state(), ConnectionState::Open);
        assert_eq!(*rx.borrow(), ConnectionState::Open);
    }

    #[test]
    fn drop_and_retry() {
        let mut sm = ConnectionStateMachine::new();
        sm.transition(ConnectionEvent::Dial).unwrap();
        sm.transition(ConnectionEvent::Dropped("refused".to_string())).unwrap();
        assert_eq!(sm.state(), ConnectionState::Closed);

        sm.transition(ConnectionEvent::Dial).unwrap();
        sm.transition(ConnectionEvent::Connected).unwrap();
        sm.transition(ConnectionEvent::Retry).unwrap();
        assert_eq!(sm.state(), ConnectionState::Connecting);
    }

    #[test]
    fn close_from_anywhere() {
        let mut sm = ConnectionStateMachine::new();
        sm.transition(ConnectionEvent::Closed).unwrap();
        sm.transition(ConnectionEvent::Dial).unwrap();
        sm.transition(ConnectionEvent::Closed).unwrap();
        assert_eq!(sm.state(), ConnectionState::Closed);
    }

    #[test]
    fn invalid_transitions() {
        let mut sm = ConnectionStateMachine::new();
        assert!(sm.transition(ConnectionEvent::Connected).is_err());
        assert!(sm.transition(ConnectionEvent::Retry).is_err());

        sm.transition(ConnectionEvent::Dial).unwrap();
        assert!(sm.transition(ConnectionEvent::Dial).is_err());
        assert_eq!(sm.state(), ConnectionState::Connecting);
    }
}
