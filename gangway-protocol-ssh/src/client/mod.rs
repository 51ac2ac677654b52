mod channel_session;
mod error;
mod handler;

use std::borrow::Cow;
use std::net::ToSocketAddrs;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use channel_session::ShellChannel;
pub use error::{is_network_error_message, ConnectionError, ErrorClass, SshClientError};
use futures::pin_mut;
use handler::{ClientHandler, ClientHandlerError, ClientHandlerEvent};
use russh::client::{AuthResult, Handle, KeyboardInteractiveAuthResponse};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{cipher, kex, Preferred};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::*;
use gangway_common::auth::AuthMethod;
use gangway_common::{SessionId, SshAlgorithms};

use crate::keys::{decode_private_key, KeyError};
use crate::{ConnectParams, InteractiveChallenge, InteractivePrompt, PtyRequest, ShellOperation};

/// Events lifted from the SSH side into the session queue.
#[derive(Debug)]
pub enum RSEvent {
    State(RSState),
    Output(Bytes),
    Banner(String),
    KeyboardInteractive(InteractiveChallenge),
    ConnectionError(ConnectionError),
    AuthSucceeded(AuthMethod),
    Eof,
    Close,
    Done,
}

pub type RSCommandReply = oneshot::Sender<Result<(), SshClientError>>;

#[derive(Clone, Debug)]
pub enum RSCommand {
    Connect(Arc<ConnectParams>),
    OpenShell {
        pty: PtyRequest,
        env: Vec<(String, String)>,
    },
    ResizePty {
        rows: u32,
        cols: u32,
    },
    Data(Bytes),
    Disconnect,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RSState {
    NotInitialized,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
enum InnerEvent {
    RSCommand(RSCommand, Option<RSCommandReply>),
    ClientHandlerEvent(ClientHandlerEvent),
}

/// One SSH client connection, exclusively owned by one session and driven
/// through a command channel. A connection that fails is not reused; the
/// session spawns a fresh connector for the next attempt.
pub struct RemoteShell {
    id: SessionId,
    tx: UnboundedSender<RSEvent>,
    session: Option<Arc<Mutex<Handle<ClientHandler>>>>,
    shell_ops_tx: Option<UnboundedSender<ShellOperation>>,
    state: RSState,
    abort_rx: UnboundedReceiver<()>,
    inner_event_rx: UnboundedReceiver<InnerEvent>,
    inner_event_tx: UnboundedSender<InnerEvent>,
    child_tasks: Vec<JoinHandle<Result<(), SshClientError>>>,
}

pub struct RemoteShellHandles {
    pub event_rx: UnboundedReceiver<RSEvent>,
    pub command_tx: UnboundedSender<(RSCommand, Option<RSCommandReply>)>,
    pub abort_tx: UnboundedSender<()>,
}

impl RemoteShell {
    pub fn create(id: SessionId) -> RemoteShellHandles {
        let (event_tx, event_rx) = unbounded_channel();
        let (command_tx, mut command_rx) = unbounded_channel();
        let (abort_tx, abort_rx) = unbounded_channel();

        let (inner_event_tx, inner_event_rx) = unbounded_channel();

        let this = Self {
            id,
            tx: event_tx,
            session: None,
            shell_ops_tx: None,
            state: RSState::NotInitialized,
            inner_event_rx,
            inner_event_tx: inner_event_tx.clone(),
            child_tasks: vec![],
            abort_rx,
        };

        tokio::spawn(
            async move {
                while let Some((command, reply)) = command_rx.recv().await {
                    inner_event_tx.send(InnerEvent::RSCommand(command, reply))?
                }
                Ok::<(), anyhow::Error>(())
            }
            .instrument(Span::current()),
        );

        let _ = this.start();

        RemoteShellHandles {
            event_rx,
            command_tx,
            abort_tx,
        }
    }

    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(
            async move {
                async {
                    loop {
                        tokio::select! {
                            Some(event) = self.inner_event_rx.recv() => {
                                if self.handle_event(event).await? {
                                    break
                                }
                            }
                            Some(_) = self.abort_rx.recv() => {
                                debug!(session=%self.id, "Abort requested");
                                self.disconnect().await;
                                break
                            }
                        };
                    }
                    Ok::<(), anyhow::Error>(())
                }
                .await
                .map_err(|error| {
                    error!(?error, "Error in connector command loop");
                    let _ = self
                        .tx
                        .send(RSEvent::ConnectionError(ConnectionError::Internal));
                    anyhow::anyhow!("Error in connector command loop: {error}")
                })?;
                info!(session=%self.id, "SSH connector closed");
                Ok::<(), anyhow::Error>(())
            }
            .instrument(Span::current()),
        )
    }

    fn set_disconnected(&mut self) {
        self.session = None;
        self.shell_ops_tx = None;
        let _ = self.set_state(RSState::Disconnected);
        let _ = self.tx.send(RSEvent::Done);
    }

    fn set_state(&mut self, state: RSState) -> Result<(), SshClientError> {
        self.state = state.clone();
        self.tx
            .send(RSEvent::State(state))
            .map_err(|_| SshClientError::MpscError)?;
        Ok(())
    }

    async fn handle_event(&mut self, event: InnerEvent) -> Result<bool> {
        match event {
            InnerEvent::RSCommand(command, reply) => {
                let result = self.handle_command(command).await;
                let brk = matches!(result, Ok(true));
                if let Some(reply) = reply {
                    let _ = reply.send(result.map(|_| ()));
                }
                return Ok(brk);
            }
            InnerEvent::ClientHandlerEvent(client_event) => match client_event {
                ClientHandlerEvent::Disconnect => {
                    self.set_disconnected();
                    return Ok(true);
                }
                ClientHandlerEvent::Banner(banner) => {
                    let _ = self.tx.send(RSEvent::Banner(banner));
                }
            },
        }
        Ok(false)
    }

    async fn handle_command(&mut self, command: RSCommand) -> Result<bool, SshClientError> {
        match command {
            RSCommand::Connect(params) => match self.connect(&params).await {
                Ok(method) => {
                    let _ = self.tx.send(RSEvent::AuthSucceeded(method));
                    self.set_state(RSState::Connected)
                        .map_err(SshClientError::other)?;
                }
                Err(error) => {
                    debug!(session=%self.id, "Connect error: {}", error);
                    let _ = self.tx.send(RSEvent::ConnectionError(error));
                    self.set_disconnected();
                    return Ok(true);
                }
            },
            RSCommand::OpenShell { pty, env } => {
                self.open_shell(pty, env).await?;
            }
            RSCommand::ResizePty { rows, cols } => {
                self.shell_op(ShellOperation::ResizePty { rows, cols })?;
            }
            RSCommand::Data(data) => {
                self.shell_op(ShellOperation::Data(data))?;
            }
            RSCommand::Disconnect => {
                self.disconnect().await;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn connect(&mut self, params: &ConnectParams) -> Result<AuthMethod, ConnectionError> {
        let creds = &params.credentials;
        let address_str = format!("{}:{}", creds.host, creds.port);
        let address = match address_str
            .to_socket_addrs()
            .map_err(ConnectionError::Io)
            .and_then(|mut x| x.next().ok_or(ConnectionError::Resolve))
        {
            Ok(address) => address,
            Err(error) => {
                error!(?error, address=%address_str, "Cannot resolve target address");
                return Err(error);
            }
        };

        let _ = self.set_state(RSState::Connecting);
        info!(?address, username = &creds.username[..], "Connecting");

        let config = russh::client::Config {
            preferred: build_preferred(&params.algorithms),
            keepalive_interval: Some(params.keepalive_interval),
            keepalive_max: params.keepalive_count_max,
            ..Default::default()
        };
        let config = Arc::new(config);

        let (event_tx, mut event_rx) = unbounded_channel();
        let handler = ClientHandler {
            event_tx,
            session_id: self.id,
        };

        let fut_connect =
            tokio::time::timeout(params.ready_timeout, russh::client::connect(config, address, handler));
        pin_mut!(fut_connect);

        let mut session = tokio::select! {
            Some(_) = self.abort_rx.recv() => {
                info!(session=%self.id, "Abort requested");
                return Err(ConnectionError::Aborted);
            }
            result = &mut fut_connect => {
                match result {
                    Err(_) => return Err(ConnectionError::Timeout),
                    Ok(Err(ClientHandlerError::Ssh(russh::Error::IO(error)))) => {
                        return Err(ConnectionError::Io(error))
                    }
                    Ok(Err(ClientHandlerError::Ssh(error))) => return Err(ConnectionError::Ssh(error)),
                    Ok(Err(ClientHandlerError::Internal)) => return Err(ConnectionError::Internal),
                    Ok(Ok(session)) => session,
                }
            }
        };

        let method = self.authenticate(&mut session, params).await?;

        self.session = Some(Arc::new(Mutex::new(session)));
        info!(?address, method=%method, "Connected");

        tokio::spawn({
            let inner_event_tx = self.inner_event_tx.clone();
            async move {
                while let Some(event) = event_rx.recv().await {
                    inner_event_tx.send(InnerEvent::ClientHandlerEvent(event))?
                }
                Ok::<(), anyhow::Error>(())
            }
            .instrument(Span::current())
        });

        Ok(method)
    }

    /// Tries the permitted methods in fixed order: public key, password,
    /// keyboard-interactive. Each rejection consumes one unit of the
    /// session's attempt budget; a malformed key consumes none.
    async fn authenticate(
        &mut self,
        session: &mut Handle<ClientHandler>,
        params: &ConnectParams,
    ) -> Result<AuthMethod, ConnectionError> {
        let creds = &params.credentials;
        let username = creds.username.clone();
        let budget = params.attempts_budget.max(1);
        let mut attempts = 0u32;

        if let Some(pem) = &creds.private_key {
            if params.allowed_methods.contains(AuthMethod::PublicKey) {
                let passphrase = creds.passphrase.as_ref().map(|p| p.expose().as_str());
                let key = match decode_private_key(pem, passphrase) {
                    Ok(key) => key,
                    Err(KeyError::PassphraseRequired) => {
                        return Err(ConnectionError::PassphraseRequired)
                    }
                    Err(error) => {
                        debug!(session=%self.id, ?error, "Client key rejected before auth");
                        return Err(ConnectionError::InvalidKey);
                    }
                };
                let rsa_hash = session.best_supported_rsa_hash().await?.flatten();
                let auth_result = session
                    .authenticate_publickey(
                        username.clone(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), rsa_hash),
                    )
                    .await?;
                match auth_result {
                    AuthResult::Success => {
                        debug!(username=&username[..], "Authenticated with key");
                        return Ok(AuthMethod::PublicKey);
                    }
                    AuthResult::Failure { .. } => {
                        debug!(username=&username[..], "Key rejected");
                        attempts += 1;
                        if attempts >= budget {
                            return Err(ConnectionError::AuthExhausted {
                                attempts_consumed: attempts,
                            });
                        }
                    }
                }
            }
        }

        if let Some(password) = &creds.password {
            if params.allowed_methods.contains(AuthMethod::Password) {
                let auth_result = session
                    .authenticate_password(username.clone(), password.expose().clone())
                    .await?;
                match auth_result {
                    AuthResult::Success => {
                        debug!(username=&username[..], "Authenticated with password");
                        return Ok(AuthMethod::Password);
                    }
                    AuthResult::Failure { .. } => {
                        debug!(username=&username[..], "Password rejected");
                        attempts += 1;
                        if attempts >= budget {
                            return Err(ConnectionError::AuthExhausted {
                                attempts_consumed: attempts,
                            });
                        }
                    }
                }
            }
        }

        // The transport is always willing to try keyboard-interactive; it is
        // only useful when the stored password can answer locally or policy
        // lets us forward prompts to the browser.
        let can_forward = params.allowed_methods.contains(AuthMethod::KeyboardInteractive);
        let can_auto_answer = creds.password.is_some() && !params.always_forward_prompts;
        if can_forward || can_auto_answer {
            if self.try_keyboard_interactive(session, params).await? {
                debug!(username=&username[..], "Authenticated via keyboard-interactive");
                return Ok(AuthMethod::KeyboardInteractive);
            }
            attempts += 1;
        }

        if attempts == 0 {
            return Err(ConnectionError::NoMethods);
        }
        if attempts >= budget {
            Err(ConnectionError::AuthExhausted {
                attempts_consumed: attempts,
            })
        } else {
            Err(ConnectionError::Authentication {
                attempts_consumed: attempts,
            })
        }
    }

    async fn try_keyboard_interactive(
        &mut self,
        session: &mut Handle<ClientHandler>,
        params: &ConnectParams,
    ) -> Result<bool, ConnectionError> {
        let creds = &params.credentials;
        let can_forward = params.allowed_methods.contains(AuthMethod::KeyboardInteractive);

        let mut response = session
            .authenticate_keyboard_interactive_start(creds.username.clone(), None)
            .await?;
        loop {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest {
                    name,
                    instructions,
                    prompts,
                } => {
                    let disposition = classify_prompts(
                        prompts.iter().map(|p| p.prompt.as_str()),
                        creds.password.is_some(),
                        params.always_forward_prompts,
                        can_forward,
                    );
                    let answers = match disposition {
                        PromptDisposition::AnswerEmpty => vec![],
                        PromptDisposition::AnswerWithPassword => match &creds.password {
                            Some(password) => prompts
                                .iter()
                                .map(|_| password.expose().clone())
                                .collect(),
                            None => return Ok(false),
                        },
                        PromptDisposition::Forward => {
                            self.forward_prompts(name, instructions, &prompts).await?
                        }
                        PromptDisposition::GiveUp => return Ok(false),
                    };
                    response = session
                        .authenticate_keyboard_interactive_respond(answers)
                        .await?;
                }
            }
        }
    }

    /// Single-shot rendezvous with the browser: the whole prompt set goes
    /// out, exactly one answer list comes back. A dropped responder means
    /// the client went away mid-prompt.
    async fn forward_prompts(
        &mut self,
        name: String,
        instructions: String,
        prompts: &[russh::client::Prompt],
    ) -> Result<Vec<String>, ConnectionError> {
        let (responder, response_rx) = oneshot::channel();
        let challenge = InteractiveChallenge {
            name,
            instructions,
            prompts: prompts
                .iter()
                .map(|p| InteractivePrompt {
                    prompt: p.prompt.clone(),
                    echo: p.echo,
                })
                .collect(),
            responder,
        };
        self.tx
            .send(RSEvent::KeyboardInteractive(challenge))
            .map_err(|_| ConnectionError::Aborted)?;
        response_rx.await.map_err(|_| ConnectionError::Aborted)
    }

    async fn open_shell(
        &mut self,
        pty: PtyRequest,
        env: Vec<(String, String)>,
    ) -> Result<(), SshClientError> {
        if let Some(session) = &self.session {
            let session = session.lock().await;
            let channel = session.channel_open_session().await?;
            channel
                .request_pty(true, &pty.term, pty.cols, pty.rows, 0, 0, &[])
                .await?;
            for (name, value) in env {
                channel.set_env(false, name, value).await?;
            }
            channel.request_shell(true).await?;

            let (ops_tx, ops_rx) = unbounded_channel();
            self.shell_ops_tx = Some(ops_tx);

            let shell = ShellChannel::new(channel, ops_rx, self.tx.clone(), self.id);
            self.child_tasks
                .push(tokio::spawn(shell.run().instrument(Span::current())));
            info!(session=%self.id, term=%pty.term, rows=%pty.rows, cols=%pty.cols, "Shell opened");
        }
        Ok(())
    }

    fn shell_op(&mut self, op: ShellOperation) -> Result<(), SshClientError> {
        match &self.shell_ops_tx {
            Some(tx) => {
                if tx.send(op).is_err() {
                    self.shell_ops_tx = None;
                }
                Ok(())
            }
            None => {
                debug!(session=%self.id, "operation without an open shell");
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(op_tx) = self.shell_ops_tx.take() {
            let _ = op_tx.send(ShellOperation::Close);
        }
        if let Some(session) = &mut self.session {
            let _ = session
                .lock()
                .await
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
        }
        self.set_disconnected();
    }
}

impl Drop for RemoteShell {
    fn drop(&mut self) {
        for task in self.child_tasks.drain(..) {
            task.abort();
        }
        debug!(session=%self.id, "Connector dropped");
    }
}

/// What to do with one keyboard-interactive prompt set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptDisposition {
    /// Zero prompts (informational round): respond with an empty list.
    AnswerEmpty,
    /// Every prompt asks for a password we hold: answer locally.
    AnswerWithPassword,
    /// Relay the whole set to the browser.
    Forward,
    /// Nothing we can answer and policy forbids forwarding.
    GiveUp,
}

/// A prompt set is answered locally only when every prompt is
/// password-shaped, a password is on hand, and the server is not
/// configured to always relay. One non-password prompt switches the whole
/// set to forwarding.
fn classify_prompts<'a>(
    prompt_texts: impl Iterator<Item = &'a str>,
    has_password: bool,
    always_forward: bool,
    can_forward: bool,
) -> PromptDisposition {
    let mut any = false;
    let mut all_password_like = true;
    for text in prompt_texts {
        any = true;
        if !text.to_lowercase().contains("password") {
            all_password_like = false;
        }
    }
    if !any {
        return PromptDisposition::AnswerEmpty;
    }
    if has_password && all_password_like && !always_forward {
        return PromptDisposition::AnswerWithPassword;
    }
    if can_forward {
        PromptDisposition::Forward
    } else {
        PromptDisposition::GiveUp
    }
}

/// Maps the configured algorithm names onto russh's preference lists.
/// Unknown names are skipped; empty lists keep the library defaults.
fn build_preferred(algorithms: &SshAlgorithms) -> Preferred {
    let mut preferred = Preferred::default();

    let kex: Vec<_> = algorithms
        .kex
        .iter()
        .filter_map(|name| match name.as_str() {
            "curve25519-sha256" => Some(kex::CURVE25519),
            "curve25519-sha256@libssh.org" => Some(kex::CURVE25519_PRE_RFC_8731),
            "ecdh-sha2-nistp256" => Some(kex::ECDH_SHA2_NISTP256),
            "ecdh-sha2-nistp384" => Some(kex::ECDH_SHA2_NISTP384),
            "ecdh-sha2-nistp521" => Some(kex::ECDH_SHA2_NISTP521),
            "diffie-hellman-group16-sha512" => Some(kex::DH_G16_SHA512),
            "diffie-hellman-group14-sha256" => Some(kex::DH_G14_SHA256),
            "diffie-hellman-group14-sha1" => Some(kex::DH_G14_SHA1),
            "diffie-hellman-group1-sha1" => Some(kex::DH_G1_SHA1),
            other => {
                debug!(algorithm=%other, "Unsupported kex algorithm in config");
                None
            }
        })
        .collect();
    if !kex.is_empty() {
        preferred.kex = Cow::Owned(kex);
    }

    let ciphers: Vec<_> = algorithms
        .cipher
        .iter()
        .filter_map(|name| match name.as_str() {
            "chacha20-poly1305@openssh.com" => Some(cipher::CHACHA20_POLY1305),
            "aes256-gcm@openssh.com" => Some(cipher::AES_256_GCM),
            "aes256-ctr" => Some(cipher::AES_256_CTR),
            "aes192-ctr" => Some(cipher::AES_192_CTR),
            "aes128-ctr" => Some(cipher::AES_128_CTR),
            other => {
                debug!(algorithm=%other, "Unsupported cipher in config");
                None
            }
        })
        .collect();
    if !ciphers.is_empty() {
        preferred.cipher = Cow::Owned(ciphers);
    }

    preferred
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prompts_password_answered_locally() {
        assert_eq!(
            classify_prompts(["Password:"].into_iter(), true, false, true),
            PromptDisposition::AnswerWithPassword
        );
        // Case-insensitive match
        assert_eq!(
            classify_prompts(["PASSWORD for host:"].into_iter(), true, false, true),
            PromptDisposition::AnswerWithPassword
        );
    }

    #[test]
    fn test_classify_prompts_non_password_forwards_whole_set() {
        assert_eq!(
            classify_prompts(["Password:", "OTP:"].into_iter(), true, false, true),
            PromptDisposition::Forward
        );
        assert_eq!(
            classify_prompts(["OTP:"].into_iter(), false, false, true),
            PromptDisposition::Forward
        );
    }

    #[test]
    fn test_classify_prompts_always_forward_overrides_password() {
        assert_eq!(
            classify_prompts(["Password:"].into_iter(), true, true, true),
            PromptDisposition::Forward
        );
    }

    #[test]
    fn test_classify_prompts_give_up_without_forwarding() {
        assert_eq!(
            classify_prompts(["OTP:"].into_iter(), true, false, false),
            PromptDisposition::GiveUp
        );
    }

    #[test]
    fn test_classify_prompts_empty_set() {
        assert_eq!(
            classify_prompts(std::iter::empty::<&str>(), false, false, false),
            PromptDisposition::AnswerEmpty
        );
    }

    #[test]
    fn test_build_preferred_skips_unknown_names() {
        let algorithms = SshAlgorithms {
            kex: vec![
                "curve25519-sha256".to_owned(),
                "not-a-real-kex".to_owned(),
            ],
            cipher: vec!["aes256-ctr".to_owned()],
            server_host_key: vec![],
        };
        let preferred = build_preferred(&algorithms);
        assert_eq!(preferred.kex.len(), 1);
        assert_eq!(preferred.cipher.len(), 1);
    }

    #[test]
    fn test_build_preferred_empty_keeps_defaults() {
        let preferred = build_preferred(&SshAlgorithms::default());
        let defaults = Preferred::default();
        assert_eq!(preferred.kex.len(), defaults.kex.len());
        assert_eq!(preferred.cipher.len(), defaults.cipher.len());
    }
}
