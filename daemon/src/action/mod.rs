//! Action module for mouse clicks and foreground-window checks
//!
//! The executor only talks to the desktop through the `Pointer` and
//! `ForegroundWindow` traits. macOS gets a CoreGraphics backend; other
//! platforms get one that reports every pointer action as unsupported.

mod executor;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod unsupported;

pub use executor::{ActionError, ActionExecutor, ClickReport, ForegroundWindow, Pointer};

#[cfg(test)]
pub(crate) use executor::fakes;

/// Executor wired to the current platform's desktop
pub fn platform_executor() -> ActionExecutor {
    #[cfg(target_os = "macos")]
    {
        ActionExecutor::new(
            Box::new(macos::CoreGraphicsPointer),
            Box::new(macos::FrontmostWindow),
        )
    }

    #[cfg(not(target_os = "macos"))]
    {
        ActionExecutor::new(
            Box::new(unsupported::UnsupportedPointer),
            Box::new(unsupported::UnknownWindow),
        )
    }
}
