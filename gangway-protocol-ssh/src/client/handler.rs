use russh::client::Session;
use russh::keys::PublicKey;
use tokio::sync::mpsc::UnboundedSender;
use tracing::*;
use gangway_common::SessionId;

#[derive(Debug)]
pub enum ClientHandlerEvent {
    Banner(String),
    Disconnect,
}

pub struct ClientHandler {
    pub event_tx: UnboundedSender<ClientHandlerEvent>,
    pub session_id: SessionId,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientHandlerError {
    #[error("SSH")]
    Ssh(#[from] russh::Error),

    #[error("Internal error")]
    Internal,
}

impl russh::client::Handler for ClientHandler {
    type Error = ClientHandlerError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        // The gateway fronts arbitrary user-chosen hosts; there is no
        // pinned key store to validate against.
        debug!(session=%self.session_id, key=?server_public_key.algorithm(), "Server key received");
        Ok(true)
    }

    async fn auth_banner(&mut self, banner: &str, _session: &mut Session) -> Result<(), Self::Error> {
        let _ = self
            .event_tx
            .send(ClientHandlerEvent::Banner(banner.to_owned()));
        Ok(())
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        let _ = self.event_tx.send(ClientHandlerEvent::Disconnect);
        debug!(session=%self.session_id, "Dropped");
    }
}
