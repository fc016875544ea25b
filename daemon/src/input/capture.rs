//! One-shot mouse click capture
//!
//! The listener thread checks this flag on every left mouse press and only
//! forwards the press when armed. Taking the click disarms it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag between the controller and the listener thread
#[derive(Debug, Clone, Default)]
pub struct ClickCapture {
    armed: Arc<AtomicBool>,
}

impl ClickCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward the next left click
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Stop waiting for a click
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Claim the click if armed, disarming in the same step
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_is_one_shot() {
        let capture = ClickCapture::new();
        assert!(!capture.take());

        capture.arm();
        let listener_side = capture.clone();
        assert!(listener_side.is_armed());
        assert!(listener_side.take());
        assert!(!listener_side.take());
        assert!(!capture.is_armed());
    }

    #[test]
    fn test_disarm() {
        let capture = ClickCapture::new();
        capture.arm();
        capture.disarm();
        assert!(!capture.take());
    }
}
