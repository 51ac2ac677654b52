use std::error::Error;

use gangway_common::GangwayError;

#[derive(thiserror::Error, Debug)]
pub enum SshClientError {
    #[error("mpsc error")]
    MpscError,
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),
    #[error(transparent)]
    Gangway(#[from] GangwayError),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl SshClientError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ssh(#[from] russh::Error),

    #[error(transparent)]
    Key(#[from] russh::keys::Error),

    #[error("could not resolve address")]
    Resolve,

    #[error("connection timed out")]
    Timeout,

    #[error("internal error")]
    Internal,

    #[error("aborted")]
    Aborted,

    #[error("authentication failed")]
    Authentication { attempts_consumed: u32 },

    #[error("all authentication methods failed")]
    AuthExhausted { attempts_consumed: u32 },

    #[error("invalid private key format")]
    InvalidKey,

    #[error("encrypted private key requires a passphrase")]
    PassphraseRequired,

    #[error("no permitted authentication method for this credential bundle")]
    NoMethods,
}

/// How the session should react to a connection error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// DNS / TCP / timeout class: terminal for the session, never retried,
    /// never counted against the auth budget.
    Network,
    /// Counted against the auth budget; recoverable while budget remains.
    Auth,
    /// Everything else: terminal.
    Fatal,
}

// Marker substrings for transport-level failures. The uppercase errno
// names match error text produced by other stacks and proxies; the
// lowercase ones match std/russh formatting.
const NETWORK_MARKERS_EXACT: &[&str] = &[
    "ENOTFOUND",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "getaddrinfo",
];

const NETWORK_MARKERS_LOWER: &[&str] = &[
    "connection refused",
    "connection reset",
    "timed out",
    "host unreachable",
    "network unreachable",
    "name or service not known",
    "failed to lookup address",
];

pub fn is_network_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    if lower.contains("authentication") {
        return false;
    }
    NETWORK_MARKERS_EXACT.iter().any(|m| message.contains(m))
        || NETWORK_MARKERS_LOWER.iter().any(|m| lower.contains(m))
}

impl ConnectionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) | Self::Resolve | Self::Timeout => ErrorClass::Network,
            Self::Authentication { .. }
            | Self::AuthExhausted { .. }
            | Self::InvalidKey
            | Self::PassphraseRequired
            | Self::NoMethods => ErrorClass::Auth,
            Self::Ssh(error) => {
                if is_network_error_message(&error.to_string()) {
                    ErrorClass::Network
                } else {
                    ErrorClass::Fatal
                }
            }
            Self::Key(_) | Self::Internal | Self::Aborted => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_network_class() {
        let error = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(error.class(), ErrorClass::Network);
        assert_eq!(ConnectionError::Resolve.class(), ErrorClass::Network);
        assert_eq!(ConnectionError::Timeout.class(), ErrorClass::Network);
    }

    #[test]
    fn test_auth_errors_counted() {
        assert_eq!(
            ConnectionError::Authentication {
                attempts_consumed: 1
            }
            .class(),
            ErrorClass::Auth
        );
        assert_eq!(ConnectionError::InvalidKey.class(), ErrorClass::Auth);
        assert_eq!(ConnectionError::PassphraseRequired.class(), ErrorClass::Auth);
    }

    #[test]
    fn test_network_marker_substrings() {
        assert!(is_network_error_message("getaddrinfo ENOTFOUND badhost"));
        assert!(is_network_error_message("connect ECONNREFUSED 10.0.0.1:22"));
        assert!(is_network_error_message("Name or service not known"));
        // The word "authentication" disqualifies transport classification.
        assert!(!is_network_error_message(
            "client-socket authentication failure ETIMEDOUT"
        ));
        assert!(!is_network_error_message("key exchange failed"));
    }
}
