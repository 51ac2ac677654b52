use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex};
use tracing::*;
use gangway_common::SessionId;

/// Lets the registry ask a live session to shut down without holding a
/// reference into its internals.
pub trait SessionHandle {
    fn close(&mut self);
}

pub struct SessionEntry {
    pub remote_address: Option<SocketAddr>,
    pub username: Option<String>,
    pub target: Option<String>,
    pub started_at: Instant,
    pub handle: Box<dyn SessionHandle + Send + Sync>,
    change_sender: broadcast::Sender<()>,
}

impl SessionEntry {
    pub fn set_username(&mut self, username: &str) {
        self.username = Some(username.to_owned());
        self.emit_change();
    }

    pub fn set_target(&mut self, host: &str, port: u16) {
        self.target = Some(format!("{host}:{port}"));
        self.emit_change();
    }

    pub fn emit_change(&self) {
        let _ = self.change_sender.send(());
    }
}

pub struct SessionStateInit {
    pub remote_address: Option<SocketAddr>,
    pub handle: Box<dyn SessionHandle + Send + Sync>,
}

/// Process-wide registry of live sessions. The only cross-session shared
/// state besides the read-only config and the metrics counters.
pub struct State {
    pub sessions: HashMap<SessionId, Arc<Mutex<SessionEntry>>>,
    change_sender: broadcast::Sender<()>,
}

impl State {
    pub fn new() -> Arc<Mutex<Self>> {
        let sender = broadcast::channel(2).0;
        Arc::new(Mutex::new(Self {
            sessions: HashMap::new(),
            change_sender: sender,
        }))
    }

    pub fn register_session(
        &mut self,
        id: SessionId,
        init: SessionStateInit,
    ) -> Arc<Mutex<SessionEntry>> {
        let entry = Arc::new(Mutex::new(SessionEntry {
            remote_address: init.remote_address,
            username: None,
            target: None,
            started_at: Instant::now(),
            handle: init.handle,
            change_sender: self.change_sender.clone(),
        }));
        self.sessions.insert(id, entry.clone());
        debug!(session=%id, "Registered session");
        let _ = self.change_sender.send(());
        entry
    }

    pub fn remove_session(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session=%id, "Removed session");
        }
        let _ = self.change_sender.send(());
    }

    pub fn subscribe(&mut self) -> broadcast::Receiver<()> {
        self.change_sender.subscribe()
    }

    pub async fn close_all(&mut self) {
        for entry in self.sessions.values() {
            entry.lock().await.handle.close();
        }
    }
}
