use tokio::sync::mpsc::UnboundedSender;
use gangway_core::SessionHandle;

use crate::session::{SessionControl, SessionEvent};

/// Registry-facing handle: closing a session from the outside enqueues a
/// control command instead of touching session state directly.
pub struct GatewaySessionHandle {
    sender: UnboundedSender<SessionEvent>,
}

impl GatewaySessionHandle {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }
}

impl SessionHandle for GatewaySessionHandle {
    fn close(&mut self) {
        let _ = self
            .sender
            .send(SessionEvent::Control(SessionControl::Close));
    }
}
