//! Runtime configuration: where the mapping file and control socket live

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Directory name under the platform config and data dirs
const APP_DIR: &str = "keyclick";

/// Overrides the mapping file location
pub const CONFIG_ENV: &str = "KEYCLICK_CONFIG";

/// Overrides the control socket location
pub const SOCKET_ENV: &str = "KEYCLICK_SOCKET";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON file with mappings and settings
    pub config_path: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::resolve(
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            std::env::var_os(SOCKET_ENV).map(PathBuf::from),
            dirs::config_dir(),
            dirs::data_local_dir(),
        )
    }

    fn resolve(
        config_override: Option<PathBuf>,
        socket_override: Option<PathBuf>,
        config_dir: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let config_path = match config_override {
            Some(path) => path,
            None => config_dir
                .context("cannot determine config directory; set KEYCLICK_CONFIG")?
                .join(APP_DIR)
                .join("config.json"),
        };

        let socket_path = match socket_override {
            Some(path) => path,
            None => data_dir
                .context("cannot determine data directory; set KEYCLICK_SOCKET")?
                .join(APP_DIR)
                .join("daemon.sock"),
        };

        Ok(Self {
            config_path,
            socket_path,
        })
    }

    /// Replace the socket path when one was given on the command line
    pub fn with_socket(mut self, socket_path: Option<PathBuf>) -> Self {
        if let Some(path) = socket_path {
            self.socket_path = path;
        }
        self
    }
}
