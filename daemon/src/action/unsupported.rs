//! Placeholder desktop for platforms without a backend

use super::{ActionError, ForegroundWindow, Pointer};
use crate::store::Point;

pub struct UnsupportedPointer;

impl Pointer for UnsupportedPointer {
    fn position(&self) -> Result<Point, ActionError> {
        Err(ActionError::Unsupported("reading the cursor position"))
    }

    fn move_to(&self, _point: Point) -> Result<(), ActionError> {
        Err(ActionError::Unsupported("moving the cursor"))
    }

    fn left_click(&self, _point: Point) -> Result<(), ActionError> {
        Err(ActionError::Unsupported("clicking"))
    }
}

pub struct UnknownWindow;

impl ForegroundWindow for UnknownWindow {
    fn title(&self) -> Result<Option<String>, ActionError> {
        Ok(None)
    }
}
