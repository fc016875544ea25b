//! Global input listener
//!
//! Monitors system-wide key presses and, while a click capture is armed,
//! the next left mouse press. Runs on a dedicated thread with its own run
//! loop and forwards events into a tokio channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::capture::ClickCapture;
use crate::store::Point;

#[cfg(target_os = "macos")]
use super::macos::run_event_loop;

/// Events sent from the input listener to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A key went down; the payload is the normalized key name
    KeyPressed(String),
    /// Left button pressed while the click capture was armed
    MouseClicked(Point),
    /// The OS disabled the event tap (it has been re-enabled)
    TapDisabled,
}

/// Result the listener thread reports once the hook is installed (or not)
pub(super) type ReadySender = std::sync::mpsc::SyncSender<Result<(), HotkeyError>>;

/// Global input listener
pub struct InputListener {
    event_tx: mpsc::Sender<InputEvent>,
    running: Arc<AtomicBool>,
    capture: ClickCapture,
}

impl InputListener {
    /// Create a new input listener
    pub fn new(event_tx: mpsc::Sender<InputEvent>, capture: ClickCapture) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            capture,
        }
    }

    /// Start the input listener
    ///
    /// Spawns a dedicated thread that installs the OS hook and runs its
    /// event loop. Returns once the hook is installed, or with the error
    /// that prevented it.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if !cfg!(target_os = "macos") {
            return Err(HotkeyError::Unsupported);
        }

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let capture = self.capture.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let spawned = thread::Builder::new()
            .name("input-listener".to_string())
            .spawn(move || {
                info!("input listener thread started");

                if let Err(e) = run_event_loop(event_tx, running.clone(), capture, ready_tx.clone())
                {
                    error!(error = %e, "input listener error");
                    let _ = ready_tx.send(Err(e));
                }

                running.store(false, Ordering::SeqCst);
                info!("input listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(HotkeyError::ThreadExited),
        }
    }

    /// Stop the input listener
    ///
    /// The thread notices within one run loop interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.capture.disarm();
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the input listener
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("input listener is already running")]
    AlreadyRunning,

    #[error("global input capture is not supported on this platform")]
    Unsupported,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to attach event tap to the run loop")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("listener thread exited before reporting readiness")]
    ThreadExited,
}

#[cfg(not(target_os = "macos"))]
fn run_event_loop(
    _event_tx: mpsc::Sender<InputEvent>,
    _running: Arc<AtomicBool>,
    _capture: ClickCapture,
    _ready_tx: ReadySender,
) -> Result<(), HotkeyError> {
    Err(HotkeyError::Unsupported)
}
