//! IPC module for daemon-client communication

pub mod client;
mod frame;
mod protocol;
mod server;

pub use protocol::{DaemonStatus, Mode, Notification, Request, Response};
pub use server::Server;
