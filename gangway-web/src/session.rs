//! Per-socket session engine. One task per socket consumes a single event
//! queue merging client wire events, SSH connector events, and control
//! commands, so the state machine never sees interleaved mutations.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::*;
use gangway_common::auth::{evaluate, AuthMethod, PolicyDecision};
use gangway_common::consts::{
    MAX_AUTH_ATTEMPTS, MSG_AUTH_EXHAUSTED, MSG_AUTH_FAILED, MSG_AUTH_METHOD_DISABLED,
    MSG_INVALID_CREDENTIALS, MSG_KEY_SHAPE_INVALID, MSG_PASSPHRASE_REQUIRED, MSG_SHELL_ERROR,
    MSG_UNEXPECTED_ERROR,
};
use gangway_common::{
    clamp_dimension, resolve_dimensions, sanitize_env, sanitize_term, CredentialError, Credentials,
    GangwayConfig, GangwayError, Secret, SessionId, TerminalDimensions,
};
use gangway_core::{AuthPipeline, SessionCounters, SessionEntry};
use gangway_protocol_ssh::{
    ConnectParams, ConnectionError, ErrorClass, InteractiveChallenge, PtyRequest, RSCommand,
    RSCommandReply, RSEvent, RSState, RemoteShellHandles,
};

use crate::event::{
    AuthenticatePayload, AuthenticationAction, ClientEvent, PromptSpec, ServerEvent,
    TerminalPayload,
};
use crate::logging;

/// Lifecycle of one socket. All transitions except the self-loops in
/// `ShellReady` are one-shot; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Init,
    AwaitingAuth,
    Authenticating,
    Connecting,
    ShellReady,
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum SessionControl {
    /// Administrative close (registry shutdown).
    Close,
    /// The WebSocket went away.
    SocketClosed,
}

#[derive(Debug)]
pub enum SessionEvent {
    Client(ClientEvent),
    /// Connector events, tagged with the connector generation that produced
    /// them so stale events from a torn-down connection are ignored.
    Remote(u64, RSEvent),
    Control(SessionControl),
}

/// Produces a fresh connector per connection attempt. Tests substitute a
/// channel-backed fake.
pub type ConnectorFactory = Box<dyn Fn(SessionId) -> RemoteShellHandles + Send>;

/// The per-socket record of who this session is connected to and how.
/// Exclusively owned by the session task.
pub struct SessionRecord {
    pub id: SessionId,
    pub credentials: Option<Credentials>,
    pub auth_method_in_effect: Option<AuthMethod>,
    pub requested_keyboard_interactive: bool,
    pub stored_replay_password: Option<Secret<String>>,
    pub username: Option<String>,
    pub target_host: Option<String>,
    pub target_port: u16,
    pub initial_term: String,
    pub live_term: Option<TerminalDimensions>,
    pub auth_attempts: u32,
    pub created_at: Instant,
    pub last_activity_at: Instant,
}

struct RemoteConnection {
    command_tx: UnboundedSender<(RSCommand, Option<RSCommandReply>)>,
    abort_tx: UnboundedSender<()>,
    pump: JoinHandle<()>,
}

pub struct SessionInit {
    pub id: SessionId,
    pub config: Arc<GangwayConfig>,
    pub counters: Arc<SessionCounters>,
    pub pipeline: AuthPipeline,
    /// `sshterm` from the landing URL, already sanitized.
    pub term_override: Option<String>,
    /// Client environment from the landing URL; sanitized again at shell
    /// open time.
    pub env: Vec<(String, String)>,
    /// Header bar text and background resolved from the landing URL and
    /// config; pushed to the client once connected.
    pub header: Option<String>,
    pub header_background: Option<String>,
    pub outbound: UnboundedSender<ServerEvent>,
    pub connector: ConnectorFactory,
    /// Registry entry for this session, when one was registered.
    pub entry: Option<Arc<Mutex<SessionEntry>>>,
}

pub struct Session {
    id: SessionId,
    config: Arc<GangwayConfig>,
    counters: Arc<SessionCounters>,
    outbound: UnboundedSender<ServerEvent>,
    events_tx: UnboundedSender<SessionEvent>,
    connector: ConnectorFactory,
    pipeline: AuthPipeline,
    entry: Option<Arc<Mutex<SessionEntry>>>,
    env: Vec<(String, String)>,
    header: Option<String>,
    header_background: Option<String>,
    stage: SessionStage,
    record: SessionRecord,
    remote: Option<RemoteConnection>,
    remote_gen: u64,
    ki_responder: Option<(oneshot::Sender<Vec<String>>, usize)>,
    last_terminal: Option<(Option<String>, Option<u16>, Option<u16>)>,
    shell_open: bool,
}

impl Session {
    /// Spawns the session task over the caller-owned event queue; all
    /// mutations flow through `events_rx`.
    pub fn start(
        init: SessionInit,
        events_tx: UnboundedSender<SessionEvent>,
        events_rx: UnboundedReceiver<SessionEvent>,
    ) -> JoinHandle<()> {
        let id = init.id;

        let initial_term = init
            .term_override
            .clone()
            .unwrap_or_else(|| init.config.ssh.term.clone());

        let session = Session {
            id,
            record: SessionRecord {
                id,
                credentials: None,
                auth_method_in_effect: None,
                requested_keyboard_interactive: false,
                stored_replay_password: None,
                username: None,
                target_host: None,
                target_port: init.config.ssh.port,
                initial_term,
                live_term: None,
                auth_attempts: 0,
                created_at: Instant::now(),
                last_activity_at: Instant::now(),
            },
            config: init.config,
            counters: init.counters,
            outbound: init.outbound,
            events_tx: events_tx.clone(),
            connector: init.connector,
            pipeline: init.pipeline,
            entry: init.entry,
            env: init.env,
            header: init.header,
            header_background: init.header_background,
            stage: SessionStage::Init,
            remote: None,
            remote_gen: 0,
            ki_responder: None,
            last_terminal: None,
            shell_open: false,
        };

        tokio::spawn(
            session
                .run(events_rx)
                .instrument(info_span!("session", id=%id)),
        )
    }

    async fn run(mut self, mut events_rx: UnboundedReceiver<SessionEvent>) {
        // Top-level guard: unexpected errors become a generic failure on
        // the wire and close the session; internals never leak.
        if let Err(error) = self.bootstrap().await {
            error!(?error, "Session bootstrap failed");
            self.emit(ServerEvent::SshError(MSG_UNEXPECTED_ERROR.into()));
            self.close().await;
        }

        while self.stage != SessionStage::Closed {
            let Some(event) = events_rx.recv().await else {
                self.close().await;
                break;
            };
            if let Err(error) = self.handle_event(event).await {
                error!(?error, "Session engine error");
                self.emit(ServerEvent::SshError(
                    GangwayError::from(error).user_message(),
                ));
                self.close().await;
            }
        }

        logging::session_event(
            self.id,
            "closed",
            "ok",
            &format!(
                "Session finished after {:?}",
                self.record.created_at.elapsed()
            ),
        );
    }

    async fn bootstrap(&mut self) -> anyhow::Result<()> {
        let default_host = self.config.ssh.host.clone();
        match self
            .pipeline
            .credentials(default_host.as_deref(), self.config.ssh.port)
        {
            Some(bundle) => self.begin_authentication(bundle).await,
            None => {
                if self.config.ssh.disable_interactive_auth {
                    logging::session_event(
                        self.id,
                        "refused",
                        "fail",
                        "No inherited credentials and interactive auth is disabled",
                    );
                    self.emit(ServerEvent::SshError(MSG_UNEXPECTED_ERROR.into()));
                    self.close().await;
                } else {
                    self.stage = SessionStage::AwaitingAuth;
                    self.emit(ServerEvent::Authentication(
                        AuthenticationAction::RequestAuth,
                    ));
                }
                Ok(())
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> anyhow::Result<()> {
        match event {
            SessionEvent::Client(event) => {
                self.record.last_activity_at = Instant::now();
                self.handle_client_event(event).await
            }
            SessionEvent::Remote(generation, event) => {
                if generation != self.remote_gen {
                    debug!(generation, "Dropping event from stale connector");
                    return Ok(());
                }
                self.handle_remote_event(event).await
            }
            SessionEvent::Control(control) => {
                debug!(?control, "Session control");
                self.close().await;
                Ok(())
            }
        }
    }

    async fn handle_client_event(&mut self, event: ClientEvent) -> anyhow::Result<()> {
        if matches!(self.stage, SessionStage::Closing | SessionStage::Closed) {
            return Ok(());
        }
        match event {
            ClientEvent::Authenticate(payload) => self.handle_authenticate(payload).await,
            ClientEvent::KeyboardInteractiveResponse(answers) => {
                self.handle_keyboard_interactive_response(answers);
                Ok(())
            }
            ClientEvent::Terminal(payload) => self.handle_terminal(payload).await,
            ClientEvent::Resize { rows, cols } => {
                self.handle_resize(rows, cols);
                Ok(())
            }
            ClientEvent::Data(data) => {
                // Dropped silently outside ShellReady.
                if self.stage == SessionStage::ShellReady {
                    self.counters.add_bytes_to_remote(data.len() as u64);
                    self.send_remote(RSCommand::Data(Bytes::from(data.into_bytes())));
                }
                Ok(())
            }
            ClientEvent::Control(action) => self.handle_control(&action).await,
            ClientEvent::Disconnect => {
                self.close().await;
                Ok(())
            }
        }
    }

    async fn handle_authenticate(&mut self, payload: AuthenticatePayload) -> anyhow::Result<()> {
        if !matches!(
            self.stage,
            SessionStage::Init | SessionStage::AwaitingAuth | SessionStage::Authenticating
        ) {
            logging::bad_request(self.id, "authenticate outside of auth phase");
            return Ok(());
        }

        if let Some(term) = payload.term.as_deref().and_then(sanitize_term) {
            self.record.initial_term = term;
        }
        self.ingest_dimensions(payload.rows, payload.cols);

        // The submitted bundle is authoritative; inherited sources only
        // fill in target coordinates the client did not repeat.
        let merged = self.pipeline.merged();
        let bundle = Credentials {
            username: payload.username.or(merged.username).unwrap_or_default(),
            host: payload
                .host
                .or(merged.host)
                .or_else(|| self.config.ssh.host.clone())
                .unwrap_or_default(),
            port: payload
                .port
                .or(merged.port)
                .unwrap_or(self.config.ssh.port),
            password: payload.password.map(Secret::new),
            private_key: payload.private_key,
            passphrase: payload.passphrase.map(Secret::new),
        };

        if self.stage == SessionStage::Authenticating {
            // Duplicate submission of the bundle already being tried.
            if self.record.credentials.as_ref() == Some(&bundle) {
                return Ok(());
            }
            logging::bad_request(self.id, "authenticate while a previous attempt is running");
            return Ok(());
        }

        self.begin_authentication(bundle).await
    }

    async fn begin_authentication(&mut self, bundle: Credentials) -> anyhow::Result<()> {
        if self.record.auth_attempts >= MAX_AUTH_ATTEMPTS {
            self.emit_auth_failure(MSG_AUTH_EXHAUSTED);
            self.stage = SessionStage::AwaitingAuth;
            return Ok(());
        }

        if let Err(error) = bundle.validate() {
            logging::session_event(self.id, "auth", "fail", &error.to_string());
            let message = match error {
                CredentialError::KeyShapeInvalid => MSG_KEY_SHAPE_INVALID,
                _ => MSG_INVALID_CREDENTIALS,
            };
            self.emit_auth_failure(message);
            self.stage = SessionStage::AwaitingAuth;
            return Ok(());
        }

        // Recoverable: the client is asked again rather than the session
        // dying.
        if bundle.needs_passphrase() {
            self.emit_auth_failure(MSG_PASSPHRASE_REQUIRED);
            self.stage = SessionStage::AwaitingAuth;
            return Ok(());
        }

        match evaluate(
            &self.config.ssh.allowed_auth_methods,
            bundle.policy_context(self.record.requested_keyboard_interactive),
        ) {
            PolicyDecision::Violation(method) => {
                logging::session_event(
                    self.id,
                    "auth_method_disabled",
                    "fail",
                    method.wire_name(),
                );
                self.emit(ServerEvent::SshAuthFailure {
                    error: "auth_method_disabled".into(),
                    method: method.wire_name().into(),
                });
                self.emit_auth_failure(MSG_AUTH_METHOD_DISABLED);
                self.stage = SessionStage::AwaitingAuth;
                return Ok(());
            }
            PolicyDecision::Ok => {}
        }

        self.record.username = Some(bundle.username.clone());
        self.record.target_host = Some(bundle.host.clone());
        self.record.target_port = bundle.port;
        self.record.credentials = Some(bundle.clone());

        self.stage = SessionStage::Authenticating;
        self.counters.record_auth_attempt();
        logging::session_event(self.id, "auth", "pending", "Connecting to target");

        self.spawn_connector();
        let params = ConnectParams {
            credentials: bundle,
            algorithms: self.config.ssh.algorithms.clone(),
            ready_timeout: self.config.ssh.ready_timeout,
            keepalive_interval: self.config.ssh.keepalive_interval,
            keepalive_count_max: self.config.ssh.keepalive_count_max,
            allowed_methods: self.config.ssh.allowed_auth_methods.clone(),
            always_forward_prompts: self.config.ssh.always_send_keyboard_interactive_prompts,
            attempts_budget: MAX_AUTH_ATTEMPTS - self.record.auth_attempts,
        };
        self.send_remote(RSCommand::Connect(Arc::new(params)));
        Ok(())
    }

    async fn handle_remote_event(&mut self, event: RSEvent) -> anyhow::Result<()> {
        if matches!(self.stage, SessionStage::Closing | SessionStage::Closed) {
            return Ok(());
        }
        match event {
            RSEvent::AuthSucceeded(method) => self.handle_auth_success(method).await,
            RSEvent::ConnectionError(error) => self.handle_connection_error(error).await,
            RSEvent::KeyboardInteractive(challenge) => {
                self.handle_keyboard_interactive(challenge);
                Ok(())
            }
            RSEvent::Banner(banner) => {
                // Auth banners surface in the terminal ahead of the shell.
                self.emit(ServerEvent::Data(banner.replace('\n', "\r\n")));
                Ok(())
            }
            RSEvent::Output(data) => {
                if self.stage == SessionStage::ShellReady {
                    self.counters.add_bytes_to_client(data.len() as u64);
                    self.emit(ServerEvent::Data(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Ok(())
            }
            RSEvent::State(state) => {
                match state {
                    RSState::Disconnected => {
                        if matches!(
                            self.stage,
                            SessionStage::Connecting | SessionStage::ShellReady
                        ) {
                            self.emit_status("Disconnected");
                            self.close().await;
                        }
                    }
                    state => debug!(?state, "Connector state"),
                }
                Ok(())
            }
            RSEvent::Eof | RSEvent::Close => {
                if self.stage == SessionStage::ShellReady {
                    self.emit_status("Disconnected");
                    self.close().await;
                }
                Ok(())
            }
            RSEvent::Done => {
                // Expected after a failed auth round; fatal mid-shell.
                if matches!(
                    self.stage,
                    SessionStage::Connecting | SessionStage::ShellReady
                ) {
                    self.close().await;
                }
                Ok(())
            }
        }
    }

    async fn handle_auth_success(&mut self, method: AuthMethod) -> anyhow::Result<()> {
        self.record.auth_method_in_effect = Some(method);
        if self.config.options.allow_replay {
            self.record.stored_replay_password = self
                .record
                .credentials
                .as_ref()
                .and_then(|c| c.password.clone());
        }
        logging::session_event(self.id, "auth", "ok", method.wire_name());

        if let Some(entry) = &self.entry {
            let mut entry = entry.lock().await;
            if let Some(username) = &self.record.username {
                entry.set_username(username);
            }
            if let Some(host) = &self.record.target_host {
                entry.set_target(host, self.record.target_port);
            }
        }

        self.emit(ServerEvent::Authentication(
            AuthenticationAction::AuthResult {
                success: true,
                message: None,
            },
        ));
        self.emit(ServerEvent::Permissions {
            auto_log: self.config.options.auto_log,
            allow_replay: self.config.options.allow_replay,
            allow_reconnect: self.config.options.allow_reconnect,
            allow_reauth: self.config.options.allow_reauth,
        });
        self.emit(ServerEvent::UpdateUi {
            element: "footer".into(),
            value: format!(
                "ssh://{}@{}:{}",
                self.record.username.as_deref().unwrap_or_default(),
                self.record.target_host.as_deref().unwrap_or_default(),
                self.record.target_port
            ),
        });
        if let Some(text) = self.header.clone() {
            self.emit(ServerEvent::UpdateUi {
                element: "header".into(),
                value: text,
            });
            if let Some(background) = self.header_background.clone() {
                self.emit(ServerEvent::UpdateUi {
                    element: "headerBackground".into(),
                    value: background,
                });
            }
        }
        self.stage = SessionStage::Connecting;
        self.emit(ServerEvent::GetTerminal(true));

        self.maybe_open_shell().await
    }

    async fn handle_connection_error(&mut self, error: ConnectionError) -> anyhow::Result<()> {
        match error.class() {
            ErrorClass::Auth => {
                let consumed = match &error {
                    ConnectionError::Authentication { attempts_consumed }
                    | ConnectionError::AuthExhausted { attempts_consumed } => *attempts_consumed,
                    _ => 0,
                };
                self.record.auth_attempts =
                    (self.record.auth_attempts + consumed).min(MAX_AUTH_ATTEMPTS);

                let message = match &error {
                    ConnectionError::InvalidKey => MSG_KEY_SHAPE_INVALID,
                    ConnectionError::PassphraseRequired => MSG_PASSPHRASE_REQUIRED,
                    ConnectionError::AuthExhausted { .. } => MSG_AUTH_EXHAUSTED,
                    _ if self.record.auth_attempts >= MAX_AUTH_ATTEMPTS => MSG_AUTH_EXHAUSTED,
                    _ => MSG_AUTH_FAILED,
                };
                logging::session_event(self.id, "auth", "fail", message);
                self.teardown_remote();
                // Inherited credentials failed; anything further must come
                // from the client.
                self.emit_auth_failure(message);
                self.stage = SessionStage::AwaitingAuth;
                self.emit(ServerEvent::Authentication(
                    AuthenticationAction::RequestAuth,
                ));
                Ok(())
            }
            ErrorClass::Network => {
                let failure = GangwayError::ConnectFailed {
                    host: self.record.target_host.clone().unwrap_or_default(),
                    port: self.record.target_port,
                    reason: error.to_string(),
                };
                logging::session_event(self.id, "connect", "fail", &failure.to_string());
                self.emit(ServerEvent::SshError(failure.user_message()));
                self.close().await;
                Ok(())
            }
            ErrorClass::Fatal => {
                logging::session_event(self.id, "ssh", "fail", &error.to_string());
                self.emit(ServerEvent::SshError(MSG_UNEXPECTED_ERROR.into()));
                self.close().await;
                Ok(())
            }
        }
    }

    fn handle_keyboard_interactive(&mut self, challenge: InteractiveChallenge) {
        // Second policy gate: a prompt round may only be solicited from the
        // client when keyboard-interactive is permitted. Otherwise fall
        // back to a plain auth request; the dropped responder aborts the
        // connector's attempt and teardown keeps its death throes stale.
        if !self
            .config
            .ssh
            .allowed_auth_methods
            .contains(AuthMethod::KeyboardInteractive)
        {
            logging::session_event(
                self.id,
                "auth_method_disabled",
                "fail",
                AuthMethod::KeyboardInteractive.wire_name(),
            );
            self.emit(ServerEvent::SshAuthFailure {
                error: "auth_method_disabled".into(),
                method: AuthMethod::KeyboardInteractive.wire_name().into(),
            });
            self.emit_auth_failure(MSG_AUTH_METHOD_DISABLED);
            drop(challenge);
            self.teardown_remote();
            self.stage = SessionStage::AwaitingAuth;
            self.emit(ServerEvent::Authentication(
                AuthenticationAction::RequestAuth,
            ));
            return;
        }
        self.record.requested_keyboard_interactive = true;
        let prompts: Vec<PromptSpec> = challenge
            .prompts
            .iter()
            .map(|p| PromptSpec {
                prompt: p.prompt.clone(),
                echo: p.echo,
            })
            .collect();
        self.ki_responder = Some((challenge.responder, prompts.len()));
        self.emit(ServerEvent::Authentication(
            AuthenticationAction::KeyboardInteractive {
                name: challenge.name,
                instructions: challenge.instructions,
                prompts,
            },
        ));
    }

    fn handle_keyboard_interactive_response(&mut self, answers: Vec<String>) {
        match self.ki_responder.take() {
            Some((responder, expected)) if answers.len() == expected => {
                let _ = responder.send(answers);
            }
            Some(pending) => {
                logging::bad_request(self.id, "keyboard-interactive answer count mismatch");
                self.ki_responder = Some(pending);
            }
            None => {
                logging::bad_request(self.id, "unsolicited keyboard-interactive response");
            }
        }
    }

    async fn handle_terminal(&mut self, payload: TerminalPayload) -> anyhow::Result<()> {
        let key = (
            payload.term.clone(),
            clamp_dimension(payload.rows),
            clamp_dimension(payload.cols),
        );
        if self.last_terminal.as_ref() == Some(&key) {
            return Ok(());
        }
        self.last_terminal = Some(key);

        if let Some(term) = payload.term.as_deref().and_then(sanitize_term) {
            if !self.shell_open {
                self.record.initial_term = term;
            }
        }
        let before = self.record.live_term;
        self.ingest_dimensions(payload.rows, payload.cols);

        if self.stage == SessionStage::ShellReady {
            if let Some(dims) = self.record.live_term {
                if before != Some(dims) {
                    self.counters.record_resize();
                    self.send_remote(RSCommand::ResizePty {
                        rows: dims.rows as u32,
                        cols: dims.cols as u32,
                    });
                }
            }
            return Ok(());
        }

        self.maybe_open_shell().await
    }

    fn handle_resize(&mut self, rows: Option<f64>, cols: Option<f64>) {
        if self.stage != SessionStage::ShellReady {
            return;
        }
        let resolved = resolve_dimensions(rows, cols, self.record.live_term);
        if self.record.live_term == Some(resolved) {
            // Unchanged geometry issues no window change.
            return;
        }
        self.record.live_term = Some(resolved);
        self.counters.record_resize();
        self.send_remote(RSCommand::ResizePty {
            rows: resolved.rows as u32,
            cols: resolved.cols as u32,
        });
    }

    async fn handle_control(&mut self, action: &str) -> anyhow::Result<()> {
        match action {
            "replayCredentials" => {
                if !self.config.options.allow_replay {
                    logging::bad_request(self.id, "replayCredentials while replay is disabled");
                    return Ok(());
                }
                if self.stage != SessionStage::ShellReady {
                    return Ok(());
                }
                if let Some(password) = self.record.stored_replay_password.clone() {
                    let mut line = password.expose().clone();
                    line.push('\r');
                    self.counters.record_replay();
                    logging::session_event(self.id, "replay", "ok", "Replayed credentials");
                    self.send_remote(RSCommand::Data(Bytes::from(line.into_bytes())));
                }
                Ok(())
            }
            "reauth" => {
                if !self.config.options.allow_reauth {
                    logging::bad_request(self.id, "reauth while reauth is disabled");
                    return Ok(());
                }
                logging::session_event(self.id, "reauth", "pending", "Client requested reauth");
                self.teardown_remote();
                self.shell_open = false;
                self.record.auth_method_in_effect = None;
                self.record.credentials = None;
                self.record.requested_keyboard_interactive = false;
                self.stage = SessionStage::AwaitingAuth;
                self.emit(ServerEvent::Authentication(
                    AuthenticationAction::RequestAuth,
                ));
                Ok(())
            }
            other => {
                logging::bad_request(self.id, &format!("unknown control action {other:?}"));
                Ok(())
            }
        }
    }

    async fn maybe_open_shell(&mut self) -> anyhow::Result<()> {
        if self.stage != SessionStage::Connecting || self.shell_open {
            return Ok(());
        }
        // The shell waits for the client's geometry; opening blind would
        // render at the wrong size.
        let Some(dims) = self.record.live_term else {
            return Ok(());
        };

        let term = self.record.initial_term.clone();
        let mut env = vec![("TERM".to_owned(), term.clone())];
        env.extend(sanitize_env(&self.env));

        let pty = PtyRequest {
            term,
            rows: dims.rows as u32,
            cols: dims.cols as u32,
        };
        match self.send_remote_wait(RSCommand::OpenShell { pty, env }).await {
            Ok(()) => {
                self.shell_open = true;
                self.stage = SessionStage::ShellReady;
                logging::session_event(self.id, "shell", "ok", "Shell ready");
                self.emit_status("Connected");
                Ok(())
            }
            Err(error) => {
                logging::session_event(self.id, "shell", "fail", &error.to_string());
                self.emit(ServerEvent::SshError(MSG_SHELL_ERROR.into()));
                self.close().await;
                Ok(())
            }
        }
    }

    fn ingest_dimensions(&mut self, rows: Option<f64>, cols: Option<f64>) {
        if clamp_dimension(rows).is_none() && clamp_dimension(cols).is_none() {
            return;
        }
        let fallback = self.record.live_term.unwrap_or(TerminalDimensions {
            rows: self.config.terminal.rows,
            cols: self.config.terminal.cols,
        });
        self.record.live_term = Some(resolve_dimensions(rows, cols, Some(fallback)));
    }

    fn spawn_connector(&mut self) {
        self.teardown_remote();
        let generation = self.remote_gen;

        let RemoteShellHandles {
            mut event_rx,
            command_tx,
            abort_tx,
        } = (self.connector)(self.id);
        let events_tx = self.events_tx.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if events_tx
                    .send(SessionEvent::Remote(generation, event))
                    .is_err()
                {
                    break;
                }
            }
        });
        self.remote = Some(RemoteConnection {
            command_tx,
            abort_tx,
            pump,
        });
    }

    fn teardown_remote(&mut self) {
        self.ki_responder = None;
        // Everything a torn-down connector emits from here on carries an
        // old generation and is dropped by handle_event.
        self.remote_gen += 1;
        if let Some(remote) = self.remote.take() {
            let _ = remote.command_tx.send((RSCommand::Disconnect, None));
            let _ = remote.abort_tx.send(());
            // The pump drains by itself once the connector drops its event
            // sender.
            drop(remote.pump);
        }
    }

    fn send_remote(&mut self, command: RSCommand) {
        if let Some(remote) = &self.remote {
            if remote.command_tx.send((command, None)).is_err() {
                debug!("Connector command channel closed");
            }
        }
    }

    async fn send_remote_wait(&mut self, command: RSCommand) -> anyhow::Result<()> {
        let Some(remote) = &self.remote else {
            anyhow::bail!("no active connection");
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        remote
            .command_tx
            .send((command, Some(reply_tx)))
            .map_err(|_| anyhow::anyhow!("connector command channel closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("connector dropped the reply"))??;
        Ok(())
    }

    fn emit(&mut self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            debug!("Outbound channel closed");
        }
    }

    fn emit_auth_failure(&mut self, message: &str) {
        self.emit(ServerEvent::Authentication(
            AuthenticationAction::AuthResult {
                success: false,
                message: Some(message.to_owned()),
            },
        ));
    }

    fn emit_status(&mut self, value: &str) {
        self.emit(ServerEvent::UpdateUi {
            element: "status".into(),
            value: value.into(),
        });
    }

    /// Idempotent: repeated disconnects after the first are no-ops.
    async fn close(&mut self) {
        if matches!(self.stage, SessionStage::Closing | SessionStage::Closed) {
            return;
        }
        self.stage = SessionStage::Closing;
        self.teardown_remote();
        self.shell_open = false;
        self.stage = SessionStage::Closed;
    }
}
