//! Remote session data model

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bastion_protocol::TerminalSize;

use crate::credentials::{AuthMethodKind, CredentialBundle};
use crate::time::current_time_secs;

/// Unique identifier for a bridged session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Allocate a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0.simple())
    }
}

/// Session lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// Shell channel being opened
    Connecting = 0,
    /// Shell running, workers relaying
    Active = 1,
    /// Shell ended or cancelled, teardown pending
    Closing = 2,
    /// All resources released
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One authenticated shell session bound to one client channel.
///
/// Shared between the bridge workers; all mutable fields are atomics.
#[derive(Debug)]
pub struct RemoteSession {
    /// Session identifier
    pub id: SessionId,
    /// Remote host
    pub host: String,
    /// Remote user
    pub user: String,
    /// Authentication methods that were offered
    pub auth_methods: Vec<AuthMethodKind>,
    /// Unix time the session was created
    pub started_at: u64,
    size: AtomicU32,
    state: AtomicU8,
}

impl RemoteSession {
    /// Create a session in the `Connecting` state
    pub fn new(credentials: &CredentialBundle, size: TerminalSize) -> Self {
        Self {
            id: SessionId::new(),
            host: credentials.host.clone(),
            user: credentials.user.clone(),
            auth_methods: credentials.auth_methods(),
            started_at: current_time_secs(),
            size: AtomicU32::new(pack_size(size)),
            state: AtomicU8::new(SessionState::Connecting as u8),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move forward to `next`.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// session was already at or past `next`.
    pub fn advance(&self, next: SessionState) -> bool {
        let previous = self.state.fetch_max(next as u8, Ordering::SeqCst);
        previous < next as u8
    }

    /// Current terminal geometry
    pub fn size(&self) -> TerminalSize {
        unpack_size(self.size.load(Ordering::SeqCst))
    }

    /// Record new terminal geometry
    pub fn set_size(&self, size: TerminalSize) {
        self.size.store(pack_size(size), Ordering::SeqCst);
    }
}

fn pack_size(size: TerminalSize) -> u32 {
    (u32::from(size.rows) << 16) | u32::from(size.cols)
}

fn unpack_size(packed: u32) -> TerminalSize {
    TerminalSize::new((packed >> 16) as u16, (packed & 0xffff) as u16)
}
