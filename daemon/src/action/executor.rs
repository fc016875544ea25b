//! Click execution and the foreground-window gate

use tracing::{debug, warn};

use crate::store::Point;

/// Errors from desktop actions
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("failed to create event source")]
    EventSource,

    #[error("failed to create {0} event")]
    EventCreation(&'static str),

    #[error("failed to move cursor (CGError {0})")]
    CursorWarp(i32),
}

/// Cursor control
pub trait Pointer: Send {
    /// Current cursor position
    fn position(&self) -> Result<Point, ActionError>;

    /// Move the cursor without clicking
    fn move_to(&self, point: Point) -> Result<(), ActionError>;

    /// Press and release the left button at `point`
    fn left_click(&self, point: Point) -> Result<(), ActionError>;
}

/// Foreground window lookup
pub trait ForegroundWindow: Send {
    /// Title of the active window, `None` when it cannot be determined
    fn title(&self) -> Result<Option<String>, ActionError>;
}

/// What a click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickReport {
    pub target: Point,
    /// Where the cursor was put back to, if restoring
    pub restored_to: Option<Point>,
}

/// Performs clicks on behalf of the controller
pub struct ActionExecutor {
    pointer: Box<dyn Pointer>,
    window: Box<dyn ForegroundWindow>,
}

impl ActionExecutor {
    pub fn new(pointer: Box<dyn Pointer>, window: Box<dyn ForegroundWindow>) -> Self {
        Self { pointer, window }
    }

    /// Move to `target`, left click, and optionally put the cursor back
    pub fn click(&self, target: Point, restore: bool) -> Result<ClickReport, ActionError> {
        let original = if restore {
            Some(self.pointer.position()?)
        } else {
            None
        };

        self.pointer.move_to(target)?;
        self.pointer.left_click(target)?;

        if let Some(original) = original {
            self.pointer.move_to(original)?;
        }

        debug!(%target, restored_to = ?original, "click executed");
        Ok(ClickReport {
            target,
            restored_to: original,
        })
    }

    /// Whether the active window title contains `target` (case-insensitive)
    ///
    /// Returns true when the title cannot be determined so a missing
    /// platform capability never blocks clicks.
    pub fn foreground_matches(&self, target: &str) -> bool {
        match self.window.title() {
            Ok(Some(title)) => {
                let matched = title.to_lowercase().contains(&target.to_lowercase());
                debug!(%title, %target, matched, "foreground window check");
                matched
            }
            Ok(None) => {
                debug!("foreground window title unknown, allowing click");
                true
            }
            Err(e) => {
                warn!(error = %e, "foreground window lookup failed, allowing click");
                true
            }
        }
    }
}
