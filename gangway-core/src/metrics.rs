use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

/// Append-only counters for one session. Written by the session task,
/// read by the health surface.
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub bytes_to_client: AtomicU64,
    pub bytes_to_remote: AtomicU64,
    pub auth_attempts: AtomicU64,
    pub resizes: AtomicU64,
    pub replays: AtomicU64,
}

impl SessionCounters {
    pub fn add_bytes_to_client(&self, n: u64) {
        self.bytes_to_client.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_to_remote(&self, n: u64) {
        self.bytes_to_remote.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_auth_attempt(&self) {
        self.auth_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.replays.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide aggregates behind the liveness probe.
pub struct MetricsRegistry {
    started_at: Instant,
    sessions_started: AtomicU64,
    sessions_closed: AtomicU64,
    bytes_to_client: AtomicU64,
    bytes_to_remote: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started_at: Instant::now(),
            sessions_started: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            bytes_to_client: AtomicU64::new(0),
            bytes_to_remote: AtomicU64::new(0),
        })
    }

    pub fn session_started(&self) -> Arc<SessionCounters> {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        Arc::new(SessionCounters::default())
    }

    /// Folds a finished session's counters into the process aggregates.
    pub fn session_closed(&self, counters: &SessionCounters) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        self.bytes_to_client.fetch_add(
            counters.bytes_to_client.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.bytes_to_remote.fetch_add(
            counters.bytes_to_remote.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let started = self.sessions_started.load(Ordering::Relaxed);
        let closed = self.sessions_closed.load(Ordering::Relaxed);
        HealthSnapshot {
            status: "ok",
            uptime_seconds: self.started_at.elapsed().as_secs(),
            active_sessions: started.saturating_sub(closed),
            sessions_total: started,
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            bytes_to_remote: self.bytes_to_remote.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    pub sessions_total: u64,
    pub bytes_to_client: u64,
    pub bytes_to_remote: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle_counts() {
        let registry = MetricsRegistry::new();
        let counters = registry.session_started();
        counters.add_bytes_to_client(10);
        counters.add_bytes_to_remote(3);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.active_sessions, 1);

        registry.session_closed(&counters);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.sessions_total, 1);
        assert_eq!(snapshot.bytes_to_client, 10);
        assert_eq!(snapshot.bytes_to_remote, 3);
    }
}
