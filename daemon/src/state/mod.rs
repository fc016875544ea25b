//! State machine module for mode management
//!
//! Provides an explicit state machine with four states:
//! - Normal: mapped keys trigger clicks
//! - AwaitingKey: configuration step one, the next key press is captured
//! - AwaitingClick: configuration step two, the next left click is captured
//! - Disabled: key presses are ignored

mod machine;

pub use machine::{State, StateMachine, TransitionError};
