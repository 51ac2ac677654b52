use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use gangway_common::auth::AllowedAuthMethods;
use gangway_common::{Credentials, SshAlgorithms};

/// PTY geometry and terminal type for the shell request.
#[derive(Clone, Debug)]
pub struct PtyRequest {
    pub term: String,
    pub rows: u32,
    pub cols: u32,
}

/// Everything the connector needs for one connection attempt. Owned by the
/// session; handed over whole so the connector never reaches back into
/// session state.
#[derive(Debug)]
pub struct ConnectParams {
    pub credentials: Credentials,
    pub algorithms: SshAlgorithms,
    pub ready_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_count_max: usize,
    pub allowed_methods: AllowedAuthMethods,
    /// Forward every keyboard-interactive prompt set to the client, even
    /// ones the stored password could answer.
    pub always_forward_prompts: bool,
    /// Remaining authentication attempts for this session.
    pub attempts_budget: u32,
}

/// Operations accepted by the live shell channel task.
#[derive(Clone, Debug)]
pub enum ShellOperation {
    Data(Bytes),
    ResizePty { rows: u32, cols: u32 },
    Close,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractivePrompt {
    pub prompt: String,
    pub echo: bool,
}

/// A keyboard-interactive prompt set forwarded to the browser. The
/// responder is a single-shot rendezvous; dropping it aborts the attempt.
#[derive(Debug)]
pub struct InteractiveChallenge {
    pub name: String,
    pub instructions: String,
    pub prompts: Vec<InteractivePrompt>,
    pub responder: oneshot::Sender<Vec<String>>,
}
