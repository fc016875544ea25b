//! keyclick: press a keyboard key, get a mouse click at a fixed spot
//!
//! The daemon provides:
//! - Global key capture via CGEventTap
//! - Explicit state machine for Normal / Configuring / Disabled
//! - Key → screen position mappings persisted as JSON
//! - IPC server so the `keyclick` CLI can edit mappings and switch modes

mod action;
mod cli;
mod config;
mod controller;
mod events;
mod input;
mod ipc;
mod lifecycle;
mod state;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::controller::Controller;
use crate::events::StateEvent;
use crate::input::{ClickCapture, InputListener};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::store::{ConfigStore, MappingManager};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is left to client output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?.with_socket(cli.socket);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_daemon(config).await,
        command => cli::run_client(&config.socket_path, command).await,
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "keyclick daemon starting");
    info!(?config.config_path, ?config.socket_path, "configuration loaded");

    let store = ConfigStore::open(&config.config_path).context("failed to load mappings")?;
    let mappings = MappingManager::new(store);

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Input listener -> controller
    let (input_tx, input_rx) = mpsc::channel(32);
    // IPC server -> controller
    let (control_tx, control_rx) = mpsc::channel(32);
    // Controller -> subscribed IPC clients
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let capture = ClickCapture::new();
    let mut controller = Controller::new(
        mappings,
        action::platform_executor(),
        capture.clone(),
        event_tx.clone(),
    );

    // Start the input listener (runs on dedicated thread)
    let input_listener = InputListener::new(input_tx, capture);
    match input_listener.start() {
        Ok(()) => {
            info!("input listener started");
            controller.set_listener_running(input_listener.is_running());
        }
        Err(e) => {
            error!(error = %e, "failed to start input listener");
            warn!("continuing without key capture - check Accessibility permissions");
        }
    }

    let server = Server::new(&config.socket_path, control_tx, event_tx)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Dispatch input events and control requests
        _ = controller.run(input_rx, control_rx) => {
            info!("controller exited");
        }

        // Accept client connections
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    input_listener.stop();
    server.shutdown().await;

    info!("keyclick daemon stopped");

    Ok(())
}
