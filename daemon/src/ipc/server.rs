//! Unix domain socket server for IPC
//!
//! Answers `Ping` and `Subscribe` itself and forwards every other request to
//! the controller. Subscribed clients also receive event notifications.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::controller::ControlRequest;
use crate::events::StateEvent;

use super::frame::{read_message, write_message};
use super::protocol::{Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    control_tx: mpsc::Sender<ControlRequest>,
    event_tx: broadcast::Sender<StateEvent>,
    shutdown_tx: broadcast::Sender<()>,
    clients: Mutex<JoinSet<()>>,
}

/// How long shutdown waits for client handlers to flush their last reply
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

impl Server {
    /// Bind the socket
    pub fn new(
        socket_path: &Path,
        control_tx: mpsc::Sender<ControlRequest>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            control_tx,
            event_tx,
            shutdown_tx,
            clients: Mutex::new(JoinSet::new()),
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let control_tx = self.control_tx.clone();
                    let event_tx = self.event_tx.clone();
                    let shutdown_rx = self.shutdown_tx.subscribe();

                    let handler = async move {
                        let result =
                            Self::handle_client(stream, control_tx, event_tx, shutdown_rx).await;
                        if let Err(e) = result {
                            warn!(?e, "client handler error");
                        }
                    };

                    let Ok(mut clients) = self.clients.lock() else {
                        error!("client task set poisoned");
                        continue;
                    };
                    while clients.try_join_next().is_some() {}
                    clients.spawn(handler);
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Shutdown is only observed between requests, so a reply that is
    /// already being handled is always written before the handler exits.
    async fn handle_client(
        stream: UnixStream,
        control_tx: mpsc::Sender<ControlRequest>,
        event_tx: broadcast::Sender<StateEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Reads are not cancel-safe, so they live in their own task and the
        // loop below only selects on channels
        let (request_tx, mut request_rx) = mpsc::channel::<Request>(8);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_message::<_, Request>(&mut reader).await {
                    Ok(Some(request)) => {
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "bad request, disconnecting");
                        break;
                    }
                }
            }
        });

        let mut events: Option<broadcast::Receiver<StateEvent>> = None;

        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        break Ok(());
                    };
                    debug!(?request, "received request");

                    let response = match request {
                        Request::Ping => Response::Pong,
                        Request::Subscribe => {
                            if events.is_none() {
                                events = Some(event_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            Response::Subscribed
                        }
                        request => Self::forward(&control_tx, request).await,
                    };

                    if let Err(e) = write_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    match event {
                        Ok(event) => {
                            let note = Notification::Event { event };
                            if let Err(e) = write_message(&mut writer, &note).await {
                                break Err(e);
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber lagged");
                        }
                        Err(RecvError::Closed) => {
                            events = None;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("client handler shutting down");
                    break Ok(());
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Hand a request to the controller and wait for its answer
    async fn forward(control_tx: &mpsc::Sender<ControlRequest>, request: Request) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = control_tx
            .send(ControlRequest {
                request,
                reply: reply_tx,
            })
            .await;

        if sent.is_err() {
            return unavailable();
        }
        reply_rx.await.unwrap_or_else(|_| unavailable())
    }

    /// Gracefully shutdown the server
    ///
    /// Client handlers finish the request they are on, so a client that
    /// asked for the shutdown still gets its reply.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let mut clients = match self.clients.lock() {
            Ok(mut clients) => std::mem::take(&mut *clients),
            Err(_) => JoinSet::new(),
        };
        let drained = tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
            while clients.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("client handlers did not finish in time, aborting them");
            clients.abort_all();
        }

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn unavailable() -> Response {
    Response::Error {
        code: "unavailable".to_string(),
        message: "controller is not running".to_string(),
    }
}

/// Next event for a subscribed client; never resolves when not subscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<StateEvent>>,
) -> Result<StateEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::Client;
    use crate::ipc::Mode;

    /// Controller stand-in answering every request with the mode
    fn spawn_fake_controller(mut control_rx: mpsc::Receiver<ControlRequest>) {
        tokio::spawn(async move {
            while let Some(ControlRequest { request, reply }) = control_rx.recv().await {
                let response = match request {
                    Request::ToggleEnabled => Response::Mode {
                        mode: Mode::Disabled,
                    },
                    _ => Response::Error {
                        code: "unexpected".to_string(),
                        message: format!("{request:?}"),
                    },
                };
                let _ = reply.send(response);
            }
        });
    }

    async fn start_server(
        dir: &tempfile::TempDir,
    ) -> (PathBuf, broadcast::Sender<StateEvent>, std::sync::Arc<Server>) {
        let socket_path = dir.path().join("run").join("test.sock");
        let (control_tx, control_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(16);
        spawn_fake_controller(control_rx);

        let server =
            std::sync::Arc::new(Server::new(&socket_path, control_tx, event_tx.clone()).unwrap());
        let running = std::sync::Arc::clone(&server);
        tokio::spawn(async move { running.run().await });
        (socket_path, event_tx, server)
    }

    #[tokio::test]
    async fn test_ping_and_forwarded_request() {
        let dir = tempfile::tempdir().unwrap();
        let (socket_path, _events, _server) = start_server(&dir).await;

        let mut client = Client::connect(&socket_path).await.unwrap();
        assert_eq!(client.request(&Request::Ping).await.unwrap(), Response::Pong);
        assert_eq!(
            client.request(&Request::ToggleEnabled).await.unwrap(),
            Response::Mode {
                mode: Mode::Disabled
            }
        );
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let (socket_path, event_tx, _server) = start_server(&dir).await;

        let mut client = Client::connect(&socket_path).await.unwrap();
        assert_eq!(
            client.request(&Request::Subscribe).await.unwrap(),
            Response::Subscribed
        );

        let event = StateEvent::KeyCaptured {
            key: "f7".to_string(),
        };
        event_tx.send(event.clone()).unwrap();

        let note = client.next_notification().await.unwrap().unwrap();
        assert_eq!(note, Notification::Event { event });
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (socket_path, _events, server) = start_server(&dir).await;
        assert!(socket_path.exists());

        server.shutdown().await;
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_reply_reaches_client() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let (control_tx, mut control_rx) = mpsc::channel::<ControlRequest>(8);
        let (event_tx, _) = broadcast::channel(16);
        let (replied_tx, replied_rx) = oneshot::channel();

        // Answers the shutdown and stops, as the controller does
        tokio::spawn(async move {
            if let Some(ControlRequest { reply, .. }) = control_rx.recv().await {
                let _ = reply.send(Response::ShuttingDown);
                let _ = replied_tx.send(());
            }
        });

        let server =
            std::sync::Arc::new(Server::new(&socket_path, control_tx, event_tx).unwrap());
        let running = std::sync::Arc::clone(&server);
        let accept = tokio::spawn(async move { running.run().await });

        let mut client = Client::connect(&socket_path).await.unwrap();
        let request = tokio::spawn(async move { client.request(&Request::Shutdown).await });

        // Tear down the moment the controller has answered, like main does
        replied_rx.await.unwrap();
        accept.abort();
        server.shutdown().await;

        assert_eq!(request.await.unwrap().unwrap(), Response::ShuttingDown);
        assert!(!socket_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let (socket_path, _events, _server) = start_server(&dir).await;
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
