//! Command-line interface
//!
//! With no subcommand (or `run`) the binary starts the daemon. Every other
//! subcommand connects to a running daemon, sends one request and prints
//! the answer.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::ipc::client::Client;
use crate::ipc::{Notification, Request, Response};
use crate::store::SettingsPatch;

#[derive(Parser, Debug)]
#[command(name = "keyclick", version, about = "Click fixed screen positions with keyboard keys")]
pub struct Cli {
    /// Control socket path (default: $KEYCLICK_SOCKET or the local data dir)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the daemon (default)
    Run,
    /// Show daemon status
    Status,
    /// List all mappings
    List,
    /// Map a key to a screen position
    #[command(allow_negative_numbers = true)]
    Map { key: String, x: i32, y: i32 },
    /// Remove a key's mapping
    Unmap { key: String },
    /// Record a mapping: press the key, then click the target
    Configure,
    /// Abandon a configuration in progress
    Cancel,
    /// Resume clicking on mapped keys
    Enable,
    /// Ignore all keys until enabled again
    Disable,
    /// Flip between enabled and disabled
    Toggle,
    /// Show or change settings
    Settings {
        /// Move the cursor back after each click
        #[arg(long)]
        restore: Option<bool>,
        /// Only click when the target window is in front
        #[arg(long)]
        require_foreground: Option<bool>,
        /// Title substring identifying the target window
        #[arg(long)]
        target_title: Option<String>,
    },
    /// Print events as they happen
    Watch,
    /// Stop the daemon
    Stop,
}

impl Command {
    /// Request sent for this command; `None` for `run`
    pub fn to_request(&self) -> Option<Request> {
        let request = match self {
            Command::Run => return None,
            Command::Status => Request::GetStatus,
            Command::List => Request::ListMappings,
            Command::Map { key, x, y } => Request::SetMapping {
                key: key.clone(),
                x: *x,
                y: *y,
            },
            Command::Unmap { key } => Request::RemoveMapping { key: key.clone() },
            Command::Configure => Request::BeginConfigure,
            Command::Cancel => Request::CancelConfigure,
            Command::Enable => Request::SetEnabled { enabled: true },
            Command::Disable => Request::SetEnabled { enabled: false },
            Command::Toggle => Request::ToggleEnabled,
            Command::Settings {
                restore,
                require_foreground,
                target_title,
            } => {
                let patch = SettingsPatch {
                    restore_mouse_position: *restore,
                    require_foreground_window: *require_foreground,
                    target_window_title: target_title.clone(),
                };
                if patch.is_empty() {
                    Request::GetSettings
                } else {
                    Request::UpdateSettings { settings: patch }
                }
            }
            Command::Watch => Request::Subscribe,
            Command::Stop => Request::Shutdown,
        };
        Some(request)
    }
}

/// Run a client subcommand against the daemon at `socket_path`
pub async fn run_client(socket_path: &Path, command: Command) -> Result<()> {
    let Some(request) = command.to_request() else {
        bail!("`run` is not a client command");
    };

    let mut client = Client::connect(socket_path).await?;
    let response = client.request(&request).await?;
    print_response(&response)?;

    if command == Command::Watch {
        while let Some(Notification::Event { event }) = client.next_notification().await? {
            println!("{event}");
        }
    }

    Ok(())
}

fn print_response(response: &Response) -> Result<()> {
    match response {
        Response::Pong => println!("pong"),
        Response::Status(status) => {
            println!("version:   {}", status.version);
            println!("mode:      {}", status.mode);
            println!(
                "listener:  {}",
                if status.listener_running { "running" } else { "not running" }
            );
            println!("mappings:  {}", status.mappings);
            println!("uptime:    {}s", status.uptime_secs);
        }
        Response::Subscribed => println!("watching events, Ctrl-C to stop"),
        Response::Mappings { mappings } => {
            if mappings.is_empty() {
                println!("no mappings");
            }
            for (key, point) in mappings {
                println!("{key:<12} {point}");
            }
        }
        Response::Mapping { key, point } => match point {
            Some(point) => println!("{key} -> {point}"),
            None => println!("{key} is not mapped"),
        },
        Response::MappingSaved {
            key,
            x,
            y,
            replaced,
        } => {
            let verb = if *replaced { "updated" } else { "saved" };
            println!("mapping {verb}: {key} -> ({x}, {y})");
        }
        Response::MappingRemoved { key, existed } => {
            if *existed {
                println!("removed mapping for {key}");
            } else {
                println!("{key} was not mapped");
            }
        }
        Response::Mode { mode } => println!("mode: {mode}"),
        Response::Settings { settings } => {
            println!("restore_mouse_position:    {}", settings.restore_mouse_position);
            println!("require_foreground_window: {}", settings.require_foreground_window);
            println!("target_window_title:       {}", settings.target_window_title);
        }
        Response::ShuttingDown => println!("daemon stopping"),
        Response::Error { code, message } => bail!("{message} ({code})"),
    }
    Ok(())
}
