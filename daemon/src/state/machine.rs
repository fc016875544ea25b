//! Core state machine implementation
//!
//! Handles transitions between Normal, the two configuration steps, and
//! Disabled. Transitions outside the allowed set are rejected and leave the
//! state untouched.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::StateEvent;
use crate::ipc::Mode;

/// Operating states of the daemon
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    /// Mapped keys trigger clicks
    #[default]
    Normal,
    /// Configuration started, waiting for the key to map
    AwaitingKey,
    /// Key captured, waiting for the click that marks the target
    AwaitingClick { key: String },
    /// Paused, key presses are ignored
    Disabled,
}

impl State {
    pub fn is_configuring(&self) -> bool {
        matches!(self, State::AwaitingKey | State::AwaitingClick { .. })
    }

    fn kind(&self) -> StateKind {
        match self {
            State::Normal => StateKind::Normal,
            State::AwaitingKey => StateKind::AwaitingKey,
            State::AwaitingClick { .. } => StateKind::AwaitingClick,
            State::Disabled => StateKind::Disabled,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Normal => write!(f, "Normal"),
            State::AwaitingKey => write!(f, "Configuring (press a key)"),
            State::AwaitingClick { key } => write!(f, "Configuring (click target for {key})"),
            State::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Payload-free discriminant used for the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateKind {
    Normal,
    AwaitingKey,
    AwaitingClick,
    Disabled,
}

impl StateKind {
    fn can_enter(self, next: StateKind) -> bool {
        use StateKind::*;
        matches!(
            (self, next),
            (Normal, AwaitingKey)
                | (Normal, Disabled)
                | (AwaitingKey, AwaitingClick)
                | (AwaitingKey, Normal)
                | (AwaitingClick, Normal)
                | (Disabled, Normal)
        )
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot go from {from} to {to}")]
pub struct TransitionError {
    pub from: State,
    pub to: State,
}

/// Holds the current state and validates every change
pub struct StateMachine {
    /// Current state
    state: State,
    /// Time the current state was entered
    state_entered_at: Instant,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateMachine {
    /// Create a new state machine in Normal
    pub fn new(event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            state: State::Normal,
            state_entered_at: Instant::now(),
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Attempt a transition
    ///
    /// Moving to the state already held is a no-op. Moving between two
    /// `AwaitingClick` states with different keys is not allowed.
    pub fn transition(&mut self, new_state: State) -> Result<(), TransitionError> {
        if new_state == self.state {
            return Ok(());
        }

        if !self.state.kind().can_enter(new_state.kind()) {
            debug!(from = %self.state, to = %new_state, "transition rejected");
            return Err(TransitionError {
                from: self.state.clone(),
                to: new_state,
            });
        }

        self.transition_to(new_state);
        Ok(())
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: State) {
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;

        info!(
            from = %self.state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        let old_state = std::mem::replace(&mut self.state, new_state);
        self.state_entered_at = Instant::now();

        let from = Mode::from(&old_state);
        let to = Mode::from(&self.state);
        if from != to {
            let event = StateEvent::ModeChanged { from, to };
            debug!(?event, "emitting mode event");
            let _ = self.event_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_state_machine() -> (StateMachine, broadcast::Receiver<StateEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (StateMachine::new(tx), rx)
    }

    fn awaiting_click(key: &str) -> State {
        State::AwaitingClick {
            key: key.to_string(),
        }
    }

    #[test]
    fn test_initial_state() {
        let (sm, _) = create_state_machine();
        assert_eq!(sm.state(), &State::Normal);
    }

    #[test]
    fn test_configuration_flow() {
        let (mut sm, _) = create_state_machine();

        sm.transition(State::AwaitingKey).unwrap();
        assert!(sm.state().is_configuring());

        sm.transition(awaiting_click("f1")).unwrap();
        assert_eq!(sm.state(), &awaiting_click("f1"));

        sm.transition(State::Normal).unwrap();
        assert_eq!(sm.state(), &State::Normal);
    }

    #[test]
    fn test_disable_and_enable() {
        let (mut sm, _) = create_state_machine();
        sm.transition(State::Disabled).unwrap();
        assert_eq!(sm.state(), &State::Disabled);
        sm.transition(State::Normal).unwrap();
        assert_eq!(sm.state(), &State::Normal);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let (mut sm, _) = create_state_machine();

        // Cannot skip the key step
        let err = sm.transition(awaiting_click("f1")).unwrap_err();
        assert_eq!(err.from, State::Normal);
        assert_eq!(sm.state(), &State::Normal);

        // Cannot configure while disabled
        sm.transition(State::Disabled).unwrap();
        assert!(sm.transition(State::AwaitingKey).is_err());
        assert_eq!(sm.state(), &State::Disabled);

        // Cannot disable mid-configuration
        sm.transition(State::Normal).unwrap();
        sm.transition(State::AwaitingKey).unwrap();
        assert!(sm.transition(State::Disabled).is_err());

        // Cannot swap the pending key
        sm.transition(awaiting_click("a")).unwrap();
        assert!(sm.transition(awaiting_click("b")).is_err());
        assert_eq!(sm.state(), &awaiting_click("a"));
    }

    #[test]
    fn test_same_state_is_noop() {
        let (mut sm, mut rx) = create_state_machine();
        sm.transition(State::Normal).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mode_events() {
        let (mut sm, mut rx) = create_state_machine();

        sm.transition(State::AwaitingKey).unwrap();
        match rx.try_recv().unwrap() {
            StateEvent::ModeChanged { from, to } => {
                assert_eq!(from, Mode::Normal);
                assert_eq!(to, Mode::Configuring);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Both configuration steps report the same mode
        sm.transition(awaiting_click("f1")).unwrap();
        assert!(rx.try_recv().is_err());

        sm.transition(State::Normal).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            StateEvent::ModeChanged {
                from: Mode::Configuring,
                to: Mode::Normal
            }
        ));
    }
}
