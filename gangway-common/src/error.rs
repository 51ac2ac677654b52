use std::error::Error;

use crate::auth::AuthMethod;
use crate::consts;

#[derive(thiserror::Error, Debug)]
pub enum GangwayError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication method {0} is disabled")]
    AuthMethodDisabled(AuthMethod),
    #[error("authentication attempts exhausted")]
    AuthExhausted,
    #[error("connection to {host}:{port} failed: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("private key is not in a recognized PEM shape")]
    KeyShapeInvalid,
    #[error("encrypted private key requires a passphrase")]
    PassphraseRequired,
    #[error("could not open shell channel: {0}")]
    ShellOpenFailed(String),
    #[error("malformed client event: {0}")]
    Protocol(String),
    #[error("session ended")]
    SessionEnd,
    #[error("inconsistent session state")]
    InconsistentState,
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("deserialization failed: {0}")]
    DeserializeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl GangwayError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }

    /// The string shown to the browser. Internals never leak here; anything
    /// not covered by the taxonomy collapses into a generic failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => consts::MSG_INVALID_CREDENTIALS.into(),
            Self::AuthMethodDisabled(method) => {
                format!("{}: {method}", consts::MSG_AUTH_METHOD_DISABLED)
            }
            Self::AuthExhausted => consts::MSG_AUTH_EXHAUSTED.into(),
            Self::ConnectFailed { host, port, reason } => {
                if reason.is_empty() {
                    format!("{}: {host}:{port}", consts::MSG_CONNECT_FAILED)
                } else {
                    format!("{}: {host}:{port} ({reason})", consts::MSG_CONNECT_FAILED)
                }
            }
            Self::KeyShapeInvalid => consts::MSG_KEY_SHAPE_INVALID.into(),
            Self::PassphraseRequired => consts::MSG_PASSPHRASE_REQUIRED.into(),
            Self::ShellOpenFailed(_) => consts::MSG_SHELL_ERROR.into(),
            _ => consts::MSG_UNEXPECTED_ERROR.into(),
        }
    }
}

impl poem::error::ResponseError for GangwayError {
    fn status(&self) -> poem::http::StatusCode {
        poem::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}
