//! Input module for global keyboard and mouse capture
//!
//! Uses macOS CGEventTap to watch key presses system-wide and to capture a
//! single left click while a mapping is being configured.

mod capture;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod keys;
mod listener;
#[cfg(target_os = "macos")]
mod macos;

pub use capture::ClickCapture;
pub use listener::{HotkeyError, InputEvent, InputListener};
