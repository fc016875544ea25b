//! Controller tying input, mode, mappings and actions together
//!
//! The controller is the single owner of the state machine and the mapping
//! table. Input events and control requests both arrive over channels and
//! are handled one at a time.

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::action::{ActionExecutor, ClickReport};
use crate::events::{SkipReason, StateEvent};
use crate::input::{ClickCapture, InputEvent};
use crate::ipc::{DaemonStatus, Mode, Request, Response};
use crate::state::{State, StateMachine, TransitionError};
use crate::store::{
    normalize_key, MappingError, MappingManager, Point, SavedMapping, SettingsPatch,
};

/// A request from the IPC server awaiting the controller's answer
#[derive(Debug)]
pub struct ControlRequest {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Errors returned to clients
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("enable the system before adding keys")]
    Disabled,

    #[error("no configuration in progress")]
    NotConfiguring,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl ControlError {
    /// Stable identifier for the IPC error response
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Disabled => "disabled",
            ControlError::NotConfiguring => "not_configuring",
            ControlError::Transition(_) => "invalid_transition",
            ControlError::Mapping(MappingError::EmptyKey) => "invalid_key",
            ControlError::Mapping(MappingError::Config(_)) => "config_write",
        }
    }
}

impl From<ControlError> for Response {
    fn from(e: ControlError) -> Self {
        Response::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// What a key press led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Disabled, unmapped, or waiting for a click
    Ignored,
    /// Taken as the key of a new mapping
    Captured,
    /// Click performed
    Clicked(ClickReport),
    /// Mapped, but gated
    Skipped(SkipReason),
    /// Mapped, but the click failed
    Failed,
}

pub struct Controller {
    machine: StateMachine,
    mappings: MappingManager,
    executor: ActionExecutor,
    capture: ClickCapture,
    event_tx: broadcast::Sender<StateEvent>,
    started_at: Instant,
    listener_running: bool,
}

impl Controller {
    pub fn new(
        mappings: MappingManager,
        executor: ActionExecutor,
        capture: ClickCapture,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            machine: StateMachine::new(event_tx.clone()),
            mappings,
            executor,
            capture,
            event_tx,
            started_at: Instant::now(),
            listener_running: false,
        }
    }

    /// Record whether the global input hook is active
    pub fn set_listener_running(&mut self, running: bool) {
        self.listener_running = running;
    }

    pub fn mode(&self) -> Mode {
        self.machine.state().into()
    }

    /// Process input events and control requests until shutdown is
    /// requested or both channels close
    pub async fn run(
        &mut self,
        mut input_rx: mpsc::Receiver<InputEvent>,
        mut control_rx: mpsc::Receiver<ControlRequest>,
    ) {
        info!(mode = %self.mode(), mappings = self.mappings.len(), "controller started");

        loop {
            tokio::select! {
                Some(event) = input_rx.recv() => {
                    self.handle_input(event);
                }
                Some(ControlRequest { request, reply }) = control_rx.recv() => {
                    let shutdown = matches!(request, Request::Shutdown);
                    let response = self.handle_request(request);
                    if reply.send(response).is_err() {
                        debug!("client went away before the reply");
                    }
                    if shutdown {
                        info!("shutdown requested by client");
                        break;
                    }
                }
                else => break,
            }
        }

        info!("controller stopped");
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyPressed(key) => {
                self.handle_key(&key);
            }
            InputEvent::MouseClicked(point) => {
                self.handle_click(point);
            }
            InputEvent::TapDisabled => {
                warn!("input tap was disabled, events may have been missed");
            }
        }
    }

    /// Mode-gated key dispatch
    pub fn handle_key(&mut self, key: &str) -> KeyOutcome {
        match self.machine.state() {
            State::Disabled | State::AwaitingClick { .. } => KeyOutcome::Ignored,
            State::AwaitingKey => self.capture_key(key),
            State::Normal => self.fire(key),
        }
    }

    fn capture_key(&mut self, key: &str) -> KeyOutcome {
        let key = key.to_string();
        if let Err(e) = self.machine.transition(State::AwaitingClick { key: key.clone() }) {
            warn!(error = %e, "could not capture key");
            return KeyOutcome::Ignored;
        }

        self.capture.arm();
        info!(%key, "key captured, waiting for target click");
        self.emit(StateEvent::KeyCaptured { key });
        KeyOutcome::Captured
    }

    fn fire(&mut self, key: &str) -> KeyOutcome {
        let Some(point) = self.mappings.get_mapping(key) else {
            return KeyOutcome::Ignored;
        };

        let settings = self.mappings.settings();
        if settings.require_foreground_window
            && !self
                .executor
                .foreground_matches(&settings.target_window_title)
        {
            debug!(%key, target = %settings.target_window_title, "target window not in front");
            let reason = SkipReason::ForegroundMismatch;
            self.emit(StateEvent::ClickSkipped {
                key: key.to_string(),
                reason,
            });
            return KeyOutcome::Skipped(reason);
        }

        match self.executor.click(point, settings.restore_mouse_position) {
            Ok(report) => {
                info!(%key, %point, "click executed");
                self.emit(StateEvent::ClickExecuted {
                    key: key.to_string(),
                    x: point.x,
                    y: point.y,
                    restored: report.restored_to.is_some(),
                });
                KeyOutcome::Clicked(report)
            }
            Err(e) => {
                error!(%key, %point, error = %e, "click failed");
                self.emit(StateEvent::ClickFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                });
                KeyOutcome::Failed
            }
        }
    }

    /// Finish a configuration with the captured click
    ///
    /// Returns the stored mapping, or `None` when no key was pending.
    pub fn handle_click(&mut self, point: Point) -> Option<SavedMapping> {
        let State::AwaitingClick { key } = self.machine.state() else {
            debug!(%point, "click outside configuration ignored");
            return None;
        };
        let key = key.clone();

        let saved = match self.mappings.add_mapping(&key, point) {
            Ok(saved) => {
                self.emit_saved(&saved);
                Some(saved)
            }
            Err(e) => {
                error!(%key, %point, error = %e, "failed to save mapping");
                None
            }
        };

        self.capture.disarm();
        if let Err(e) = self.machine.transition(State::Normal) {
            error!(error = %e, "could not leave configuration");
        }
        saved
    }

    pub fn begin_configure(&mut self) -> Result<(), ControlError> {
        match self.machine.state() {
            State::Disabled => return Err(ControlError::Disabled),
            state if state.is_configuring() => {
                return Err(TransitionError {
                    from: state.clone(),
                    to: State::AwaitingKey,
                }
                .into())
            }
            _ => {}
        }
        self.machine.transition(State::AwaitingKey)?;
        info!("configuration started, press the key to map");
        Ok(())
    }

    pub fn cancel_configure(&mut self) -> Result<(), ControlError> {
        if !self.machine.state().is_configuring() {
            return Err(ControlError::NotConfiguring);
        }
        self.capture.disarm();
        self.machine.transition(State::Normal)?;
        info!("configuration cancelled");
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<Mode, ControlError> {
        let target = if enabled { State::Normal } else { State::Disabled };
        self.machine.transition(target)?;
        Ok(self.mode())
    }

    /// Normal ↔ Disabled; rejected while configuring
    pub fn toggle_enabled(&mut self) -> Result<Mode, ControlError> {
        match self.machine.state() {
            State::Disabled => self.set_enabled(true),
            State::Normal => self.set_enabled(false),
            state => Err(TransitionError {
                from: state.clone(),
                to: State::Disabled,
            }
            .into()),
        }
    }

    pub fn set_mapping(&mut self, key: &str, point: Point) -> Result<SavedMapping, ControlError> {
        let saved = self.mappings.add_mapping(key, point)?;
        self.emit_saved(&saved);
        Ok(saved)
    }

    pub fn remove_mapping(&mut self, key: &str) -> Result<bool, ControlError> {
        let key = normalize_key(key)?;
        let existed = self.mappings.remove_mapping(&key)?;
        if existed {
            self.emit(StateEvent::MappingRemoved { key });
        }
        Ok(existed)
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<(), ControlError> {
        if self.mappings.update_settings(patch)? {
            self.emit(StateEvent::SettingsChanged {
                settings: self.mappings.settings().clone(),
            });
        }
        Ok(())
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            mode: self.mode(),
            listener_running: self.listener_running,
            mappings: self.mappings.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            ..DaemonStatus::default()
        }
    }

    /// Answer a control request
    pub fn handle_request(&mut self, request: Request) -> Response {
        debug!(?request, "control request");

        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::Subscribe => Ok(Response::Subscribed),
            Request::GetStatus => Ok(Response::Status(self.status())),
            Request::ListMappings => Ok(Response::Mappings {
                mappings: self.mappings.all_mappings().clone(),
            }),
            Request::GetMapping { key } => normalize_key(&key)
                .map(|key| Response::Mapping {
                    point: self.mappings.get_mapping(&key),
                    key,
                })
                .map_err(ControlError::from),
            Request::SetMapping { key, x, y } => {
                self.set_mapping(&key, Point::new(x, y))
                    .map(|saved| Response::MappingSaved {
                        key: saved.key,
                        x: saved.point.x,
                        y: saved.point.y,
                        replaced: saved.replaced.is_some(),
                    })
            }
            Request::RemoveMapping { key } => self
                .remove_mapping(&key)
                .map(|existed| Response::MappingRemoved { key, existed }),
            Request::BeginConfigure => self.begin_configure().map(|()| Response::Mode {
                mode: self.mode(),
            }),
            Request::CancelConfigure => self.cancel_configure().map(|()| Response::Mode {
                mode: self.mode(),
            }),
            Request::SetEnabled { enabled } => {
                self.set_enabled(enabled).map(|mode| Response::Mode { mode })
            }
            Request::ToggleEnabled => self.toggle_enabled().map(|mode| Response::Mode { mode }),
            Request::GetSettings => Ok(Response::Settings {
                settings: self.mappings.settings().clone(),
            }),
            Request::UpdateSettings { settings } => {
                self.update_settings(settings).map(|()| Response::Settings {
                    settings: self.mappings.settings().clone(),
                })
            }
            Request::Shutdown => Ok(Response::ShuttingDown),
        };

        result.unwrap_or_else(|e| {
            warn!(code = e.code(), error = %e, "control request failed");
            e.into()
        })
    }

    fn emit_saved(&self, saved: &SavedMapping) {
        self.emit(StateEvent::MappingSaved {
            key: saved.key.clone(),
            x: saved.point.x,
            y: saved.point.y,
            replaced: saved.replaced.is_some(),
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::fakes::FakeDesktop;
    use crate::store::{ConfigFile, ConfigStore};

    struct Harness {
        controller: Controller,
        desktop: FakeDesktop,
        capture: ClickCapture,
        events: broadcast::Receiver<StateEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(ConfigFile::default())
        }

        fn with_config(config: ConfigFile) -> Self {
            let desktop = FakeDesktop::new(Point::new(3, 4));
            let capture = ClickCapture::new();
            let (event_tx, events) = broadcast::channel(64);
            let controller = Controller::new(
                MappingManager::new(ConfigStore::in_memory(config)),
                desktop.executor(),
                capture.clone(),
                event_tx,
            );
            Self {
                controller,
                desktop,
                capture,
                events,
            }
        }

        fn with_f1() -> Self {
            let mut config = ConfigFile::default();
            config.mappings.insert("f1".to_string(), Point::new(800, 500));
            Self::with_config(config)
        }

        fn drain_events(&mut self) -> Vec<StateEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    #[test]
    fn test_mapped_key_clicks_and_restores() {
        let mut h = Harness::with_f1();

        let outcome = h.controller.handle_key("f1");
        assert_eq!(
            outcome,
            KeyOutcome::Clicked(ClickReport {
                target: Point::new(800, 500),
                restored_to: Some(Point::new(3, 4)),
            })
        );
        assert_eq!(h.desktop.clicks(), vec![Point::new(800, 500)]);
        assert_eq!(h.desktop.cursor(), Point::new(3, 4));
        assert!(matches!(
            h.drain_events().as_slice(),
            [StateEvent::ClickExecuted { x: 800, y: 500, restored: true, .. }]
        ));
    }

    #[test]
    fn test_restore_disabled_leaves_cursor_on_target() {
        let mut h = Harness::with_f1();
        h.controller
            .update_settings(SettingsPatch {
                restore_mouse_position: Some(false),
                ..Default::default()
            })
            .unwrap();

        h.controller.handle_key("f1");
        assert_eq!(h.desktop.cursor(), Point::new(800, 500));
    }

    #[test]
    fn test_unmapped_key_ignored() {
        let mut h = Harness::with_f1();
        assert_eq!(h.controller.handle_key("f2"), KeyOutcome::Ignored);
        assert!(h.desktop.calls().is_empty());
    }

    #[test]
    fn test_disabled_mode_never_clicks() {
        let mut h = Harness::with_f1();
        h.controller.set_mapping("a", Point::new(1, 1)).unwrap();
        h.controller.set_enabled(false).unwrap();
        assert_eq!(h.controller.mode(), Mode::Disabled);

        for key in ["f1", "a", "space", "f1"] {
            assert_eq!(h.controller.handle_key(key), KeyOutcome::Ignored);
        }
        assert!(h.desktop.calls().is_empty());

        h.controller.toggle_enabled().unwrap();
        assert!(matches!(h.controller.handle_key("f1"), KeyOutcome::Clicked(_)));
    }

    #[test]
    fn test_foreground_gate_blocks_mismatch() {
        let mut h = Harness::with_f1();
        h.controller
            .update_settings(SettingsPatch {
                require_foreground_window: Some(true),
                ..Default::default()
            })
            .unwrap();
        h.drain_events();

        h.desktop.set_title("Safari - Start Page");
        assert_eq!(
            h.controller.handle_key("f1"),
            KeyOutcome::Skipped(SkipReason::ForegroundMismatch)
        );
        assert!(h.desktop.calls().is_empty());
        assert!(matches!(
            h.drain_events().as_slice(),
            [StateEvent::ClickSkipped { .. }]
        ));

        h.desktop.set_title("Valeton GP-5 Editor");
        assert!(matches!(h.controller.handle_key("f1"), KeyOutcome::Clicked(_)));
    }

    #[test]
    fn test_click_failure_is_reported() {
        let mut config = ConfigFile::default();
        config.mappings.insert("f1".to_string(), Point::new(800, 500));
        let mut desktop = FakeDesktop::new(Point::new(0, 0));
        desktop.fail_clicks = true;
        let (event_tx, mut events) = broadcast::channel(8);
        let mut controller = Controller::new(
            MappingManager::new(ConfigStore::in_memory(config)),
            desktop.executor(),
            ClickCapture::new(),
            event_tx,
        );

        assert_eq!(controller.handle_key("f1"), KeyOutcome::Failed);
        assert!(matches!(
            events.try_recv().unwrap(),
            StateEvent::ClickFailed { .. }
        ));
        assert_eq!(controller.mode(), Mode::Normal);
    }

    #[test]
    fn test_configuration_records_key_and_click() {
        let mut h = Harness::new();

        h.controller.begin_configure().unwrap();
        assert_eq!(h.controller.mode(), Mode::Configuring);
        assert!(!h.capture.is_armed());

        assert_eq!(h.controller.handle_key("f5"), KeyOutcome::Captured);
        assert!(h.capture.is_armed());

        // Further keys are ignored while waiting for the click
        assert_eq!(h.controller.handle_key("f6"), KeyOutcome::Ignored);

        let saved = h.controller.handle_click(Point::new(120, 340)).unwrap();
        assert_eq!(saved.key, "f5");
        assert_eq!(saved.replaced, None);
        assert!(!h.capture.is_armed());
        assert_eq!(h.controller.mode(), Mode::Normal);

        // The new mapping works straight away
        assert!(matches!(h.controller.handle_key("f5"), KeyOutcome::Clicked(_)));
        assert!(h.desktop.clicks().contains(&Point::new(120, 340)));

        let events = h.drain_events();
        assert!(events.contains(&StateEvent::KeyCaptured {
            key: "f5".to_string()
        }));
        assert!(events.contains(&StateEvent::MappingSaved {
            key: "f5".to_string(),
            x: 120,
            y: 340,
            replaced: false
        }));
    }

    #[test]
    fn test_configuring_does_not_fire_mapped_key() {
        let mut h = Harness::with_f1();
        h.controller.begin_configure().unwrap();
        assert_eq!(h.controller.handle_key("f1"), KeyOutcome::Captured);
        assert!(h.desktop.calls().is_empty());

        let saved = h.controller.handle_click(Point::new(9, 9)).unwrap();
        assert_eq!(saved.replaced, Some(Point::new(800, 500)));
    }

    #[test]
    fn test_click_outside_configuration_ignored() {
        let mut h = Harness::new();
        assert!(h.controller.handle_click(Point::new(1, 1)).is_none());

        h.controller.begin_configure().unwrap();
        assert!(h.controller.handle_click(Point::new(1, 1)).is_none());
        assert_eq!(h.controller.mode(), Mode::Configuring);
    }

    #[test]
    fn test_cancel_configuration() {
        let mut h = Harness::new();
        assert!(matches!(
            h.controller.cancel_configure(),
            Err(ControlError::NotConfiguring)
        ));

        h.controller.begin_configure().unwrap();
        h.controller.handle_key("q");
        h.controller.cancel_configure().unwrap();

        assert_eq!(h.controller.mode(), Mode::Normal);
        assert!(!h.capture.is_armed());
        assert!(h.controller.handle_click(Point::new(1, 1)).is_none());
        assert_eq!(h.controller.status().mappings, 0);
    }

    #[test]
    fn test_configure_rejected_while_disabled() {
        let mut h = Harness::new();
        h.controller.set_enabled(false).unwrap();
        assert!(matches!(
            h.controller.begin_configure(),
            Err(ControlError::Disabled)
        ));
        assert_eq!(h.controller.mode(), Mode::Disabled);
    }

    #[test]
    fn test_configure_twice_rejected() {
        let mut h = Harness::new();
        h.controller.begin_configure().unwrap();
        let err = h.controller.begin_configure().unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        h.controller.handle_key("f3");
        assert!(h.controller.begin_configure().is_err());
        assert!(h.capture.is_armed());
    }

    #[test]
    fn test_toggle_rejected_while_configuring() {
        let mut h = Harness::new();
        h.controller.begin_configure().unwrap();
        let err = h.controller.toggle_enabled().unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(h.controller.mode(), Mode::Configuring);
    }

    #[test]
    fn test_requests_round_trip_through_mapping_table() {
        let mut h = Harness::new();

        let resp = h.controller.handle_request(Request::SetMapping {
            key: "F1".to_string(),
            x: 800,
            y: 500,
        });
        assert_eq!(
            resp,
            Response::MappingSaved {
                key: "f1".to_string(),
                x: 800,
                y: 500,
                replaced: false
            }
        );

        let resp = h.controller.handle_request(Request::GetMapping {
            key: "f1".to_string(),
        });
        assert_eq!(
            resp,
            Response::Mapping {
                key: "f1".to_string(),
                point: Some(Point::new(800, 500))
            }
        );

        let resp = h.controller.handle_request(Request::GetMapping {
            key: " F1".to_string(),
        });
        assert_eq!(
            resp,
            Response::Mapping {
                key: "f1".to_string(),
                point: Some(Point::new(800, 500))
            }
        );

        let resp = h.controller.handle_request(Request::RemoveMapping {
            key: "f1".to_string(),
        });
        assert_eq!(
            resp,
            Response::MappingRemoved {
                key: "f1".to_string(),
                existed: true
            }
        );

        let resp = h.controller.handle_request(Request::ListMappings);
        assert_eq!(
            resp,
            Response::Mappings {
                mappings: Default::default()
            }
        );
    }

    #[test]
    fn test_error_response_codes() {
        let mut h = Harness::new();
        let resp = h.controller.handle_request(Request::SetMapping {
            key: " ".to_string(),
            x: 0,
            y: 0,
        });
        assert!(matches!(resp, Response::Error { ref code, .. } if code == "invalid_key"));

        let resp = h.controller.handle_request(Request::CancelConfigure);
        assert!(matches!(resp, Response::Error { ref code, .. } if code == "not_configuring"));
    }

    #[test]
    fn test_status_reports_mode_and_count() {
        let mut h = Harness::with_f1();
        h.controller.set_listener_running(true);
        h.controller.handle_request(Request::SetEnabled { enabled: false });

        let Response::Status(status) = h.controller.handle_request(Request::GetStatus) else {
            panic!("expected status");
        };
        assert_eq!(status.mode, Mode::Disabled);
        assert_eq!(status.mappings, 1);
        assert!(status.listener_running);
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_run_dispatches_input_and_stops_on_shutdown() {
        let mut h = Harness::with_f1();
        let (input_tx, input_rx) = mpsc::channel(8);
        let (control_tx, control_rx) = mpsc::channel(8);

        input_tx
            .send(InputEvent::KeyPressed("f1".to_string()))
            .await
            .unwrap();
        let (reply_tx, reply_rx) = oneshot::channel();
        control_tx
            .send(ControlRequest {
                request: Request::Shutdown,
                reply: reply_tx,
            })
            .await
            .unwrap();

        h.controller.run(input_rx, control_rx).await;

        assert_eq!(reply_rx.await.unwrap(), Response::ShuttingDown);
        // select! picks randomly between ready branches, so the key press
        // may or may not have been handled before the shutdown
        assert!(h.desktop.clicks().len() <= 1);
    }
}
