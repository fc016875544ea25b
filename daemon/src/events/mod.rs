//! Events module for state changes and actions
//!
//! Everything the controller does that a client might want to show is
//! published as a `StateEvent` on a broadcast channel.

use serde::{Deserialize, Serialize};

use crate::ipc::Mode;
use crate::store::Settings;

/// Why a mapped key did not produce a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The foreground window title did not contain the target title
    ForegroundMismatch,
}

/// Events emitted by the controller and state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Mode changed (configuration sub-steps do not emit this)
    ModeChanged { from: Mode, to: Mode },

    /// Configuration step one finished, waiting for the target click
    KeyCaptured { key: String },

    /// A mapping was created or overwritten
    MappingSaved {
        key: String,
        x: i32,
        y: i32,
        /// True when the key already had a coordinate
        replaced: bool,
    },

    /// A mapping was deleted
    MappingRemoved { key: String },

    /// A mapped key fired a click
    ClickExecuted {
        key: String,
        x: i32,
        y: i32,
        /// True when the cursor was moved back afterwards
        restored: bool,
    },

    /// A mapped key was pressed but no click was made
    ClickSkipped { key: String, reason: SkipReason },

    /// The click could not be performed
    ClickFailed { key: String, message: String },

    /// Settings were changed
    SettingsChanged { settings: Settings },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ModeChanged { from, to } => write!(f, "MODE {from} -> {to}"),
            StateEvent::KeyCaptured { key } => {
                write!(f, "KEY_CAPTURED \"{key}\", click the target position")
            }
            StateEvent::MappingSaved { key, x, y, replaced } => {
                let verb = if *replaced { "MAPPING_REPLACED" } else { "MAPPING_SAVED" };
                write!(f, "{verb} \"{key}\" -> ({x}, {y})")
            }
            StateEvent::MappingRemoved { key } => write!(f, "MAPPING_REMOVED \"{key}\""),
            StateEvent::ClickExecuted { key, x, y, .. } => {
                write!(f, "CLICK ({x}, {y}) for \"{key}\"")
            }
            StateEvent::ClickSkipped { key, reason } => {
                write!(f, "CLICK_SKIPPED \"{key}\" ({reason:?})")
            }
            StateEvent::ClickFailed { key, message } => {
                write!(f, "CLICK_FAILED \"{key}\": {message}")
            }
            StateEvent::SettingsChanged { settings } => write!(
                f,
                "SETTINGS restore={} require_foreground={} target=\"{}\"",
                settings.restore_mouse_position,
                settings.require_foreground_window,
                settings.target_window_title
            ),
        }
    }
}
