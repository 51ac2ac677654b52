//! Adapter between session lifecycle events and the structured logging
//! contract: stable `event`/`status` fields on every record.

use tracing::*;
use gangway_common::SessionId;

pub fn session_event(id: SessionId, event: &str, status: &str, message: &str) {
    info!(session=%id, event, status, "{message}");
}

/// Malformed or disallowed client input. Logged and dropped; never
/// surfaced verbatim on the wire.
pub fn bad_request(id: SessionId, reason: &str) {
    warn!(session=%id, event = "bad_request", "{reason}");
}

pub fn socket_event(id: SessionId, event: &str, message: &str) {
    debug!(session=%id, event, "{message}");
}
