//! User-visible message constants shared between the session engine and the
//! wire gateway. The browser displays these verbatim.

pub const MSG_INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const MSG_AUTH_METHOD_DISABLED: &str = "Authentication method disabled by server policy";
pub const MSG_AUTH_EXHAUSTED: &str = "All authentication methods failed";
pub const MSG_AUTH_FAILED: &str = "Authentication failed";
pub const MSG_CONNECT_FAILED: &str = "Connection failed";
pub const MSG_KEY_SHAPE_INVALID: &str = "Invalid private key format";
pub const MSG_PASSPHRASE_REQUIRED: &str = "Encrypted private key requires a passphrase";
pub const MSG_SHELL_ERROR: &str = "Shell error";
pub const MSG_UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Default PTY geometry used when the client never reported its own.
pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;

/// Authentication attempt budget per session.
pub const MAX_AUTH_ATTEMPTS: u32 = 2;
