//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::StateEvent;
use crate::state::State;
use crate::store::{Point, Settings, SettingsPatch};

/// Current operating mode of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Mapped keys trigger clicks
    #[default]
    Normal,
    /// A new mapping is being recorded
    Configuring,
    /// Key presses are ignored
    Disabled,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::Configuring => write!(f, "configuring"),
            Mode::Disabled => write!(f, "disabled"),
        }
    }
}

/// Convert internal State to IPC Mode
impl From<&State> for Mode {
    fn from(state: &State) -> Self {
        match state {
            State::Normal => Mode::Normal,
            State::AwaitingKey | State::AwaitingClick { .. } => Mode::Configuring,
            State::Disabled => Mode::Disabled,
        }
    }
}

/// Requests from clients to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to event notifications
    Subscribe,

    /// List every mapping
    ListMappings,

    /// Look up one mapping
    GetMapping { key: String },

    /// Create or overwrite a mapping
    SetMapping { key: String, x: i32, y: i32 },

    /// Delete a mapping
    RemoveMapping { key: String },

    /// Record the next key press and click as a new mapping
    BeginConfigure,

    /// Abandon a configuration in progress
    CancelConfigure,

    /// Enable or disable click dispatch
    SetEnabled { enabled: bool },

    /// Flip between enabled and disabled
    ToggleEnabled,

    /// Read the current settings
    GetSettings,

    /// Change some settings
    UpdateSettings { settings: SettingsPatch },

    /// Stop the daemon
    Shutdown,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Full mapping table
    Mappings { mappings: BTreeMap<String, Point> },

    /// Single mapping lookup
    Mapping { key: String, point: Option<Point> },

    /// Mapping stored
    MappingSaved {
        key: String,
        x: i32,
        y: i32,
        replaced: bool,
    },

    /// Mapping deletion result
    MappingRemoved { key: String, existed: bool },

    /// Mode after a mode-changing request
    Mode { mode: Mode },

    /// Current settings
    Settings { settings: Settings },

    /// Daemon is exiting
    ShuttingDown,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An event occurred
    Event { event: StateEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current mode
    pub mode: Mode,

    /// Whether the global input hook is installed
    pub listener_running: bool,

    /// Number of configured mappings
    pub mappings: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: Mode::default(),
            listener_running: false,
            mappings: 0,
            uptime_secs: 0,
        }
    }
}
