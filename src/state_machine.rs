//! Listening state: Asleep (scanning for the wake word) ⇄ Awake (capturing
//! a command). Owned by the processing thread; other threads observe
//! through a watch channel.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// The two listening modes of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ListenState {
    /// Feeding frames to the wake listener.
    Asleep,
    /// Feeding frames to the command listener.
    Awake,
}

impl std::fmt::Display for ListenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenState::Asleep => write!(f, "Asleep"),
            ListenState::Awake => write!(f, "Awake"),
        }
    }
}

impl ListenState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: ListenState) -> bool {
        matches!(
            (self, next),
            (ListenState::Asleep, ListenState::Awake) | (ListenState::Awake, ListenState::Asleep)
        )
    }
}

/// Thread-safe state holder with a watch channel for reactive subscribers.
pub struct StateMachine {
    state: RwLock<ListenState>,
    state_tx: watch::Sender<ListenState>,
    state_rx: watch::Receiver<ListenState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ListenState::Asleep);
        Self {
            state: RwLock::new(ListenState::Asleep),
            state_tx,
            state_rx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> ListenState {
        *self.state.read()
    }

    /// Attempt a state transition. Returns Ok(new_state) or Err with reason.
    pub fn transition(&self, next: ListenState) -> Result<ListenState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {current} -> {next}");
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        info!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Force the pipeline back to Asleep from any state (cancel path).
    pub fn force_sleep(&self) {
        let mut state = self.state.write();
        let prev = *state;
        *state = ListenState::Asleep;
        let _ = self.state_tx.send(ListenState::Asleep);
        info!(from = %prev, "force_sleep");
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ListenState> {
        self.state_rx.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_asleep() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ListenState::Asleep);
    }

    #[test]
    fn test_valid_round_trip() {
        let sm = StateMachine::new();
        assert!(sm.transition(ListenState::Awake).is_ok());
        assert_eq!(sm.current(), ListenState::Awake);
        assert!(sm.transition(ListenState::Asleep).is_ok());
        assert_eq!(sm.current(), ListenState::Asleep);
    }

    #[test]
    fn test_self_transition_rejected() {
        let sm = StateMachine::new();
        assert!(sm.transition(ListenState::Asleep).is_err());
        assert_eq!(sm.current(), ListenState::Asleep);
    }

    #[test]
    fn test_subscriber_sees_changes() {
        let sm = StateMachine::new();
        let rx = sm.subscribe();
        sm.transition(ListenState::Awake).unwrap();
        assert_eq!(*rx.borrow(), ListenState::Awake);
        sm.force_sleep();
        assert_eq!(*rx.borrow(), ListenState::Asleep);
    }
}
