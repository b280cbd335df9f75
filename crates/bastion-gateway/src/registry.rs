//! Registry of live bridged sessions

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use bastion_core::{RemoteSession, SessionId, SessionState};

/// Tracks every bridged session so shutdown can cancel them
pub struct SessionRegistry {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, RegisteredSession>,
}

struct RegisteredSession {
    session: Arc<RemoteSession>,
    cancel: CancellationToken,
}

/// Point-in-time view of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub host: String,
    pub user: String,
    pub state: SessionState,
    pub started_at: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a session. The returned guard removes it when dropped.
    pub fn register(
        self: &Arc<Self>,
        session: Arc<RemoteSession>,
        cancel: CancellationToken,
    ) -> Registration {
        let id = session.id;
        self.sessions.insert(id, RegisteredSession { session, cancel });
        tracing::debug!("Registered {} ({} live)", id, self.sessions.len());
        Registration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// List all sessions
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|r| SessionSummary {
                id: r.session.id.to_string(),
                host: r.session.host.clone(),
                user: r.session.user.clone(),
                state: r.session.state(),
                started_at: r.session.started_at,
            })
            .collect()
    }

    /// Cancel every live session; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for entry in self.sessions.iter() {
            entry.cancel.cancel();
            count += 1;
        }
        count
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a session registered for as long as it is held
pub struct Registration {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.sessions.remove(&self.id);
        tracing::debug!("Unregistered {}", self.id);
    }
}
