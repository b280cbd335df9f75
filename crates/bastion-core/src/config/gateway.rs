//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use bastion_protocol::TerminalSize;

use super::serde_utils::{duration_secs, optional_duration_secs};
use crate::error::ConfigError;

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_address: String,

    /// URL-safe base64 key for the access token codec.
    ///
    /// When absent, access tokens are rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_key: Option<String>,

    /// Maximum accepted token age (0 = tokens never expire)
    #[serde(with = "optional_duration_secs")]
    pub token_max_age: Option<Duration>,

    /// Upper bound on dial plus authentication
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How remote host identities are verified
    pub host_keys: HostKeyPolicy,

    /// Interactive session settings
    pub session: SessionSettings,

    /// File transfer settings
    pub transfer: TransferSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8088".to_string(),
            token_key: None,
            token_max_age: None,
            connect_timeout: Duration::from_secs(30),
            host_keys: HostKeyPolicy::default(),
            session: SessionSettings::default(),
            transfer: TransferSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "session.read_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.transfer.copy_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "transfer.copy_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.session.term.trim().is_empty() {
            return Err(ConfigError::Invalid("session.term must not be empty".to_string()));
        }
        if let HostKeyPolicy::Pinned { fingerprints } = &self.host_keys {
            if fingerprints.is_empty() {
                return Err(ConfigError::Invalid(
                    "host_keys.fingerprints must list at least one fingerprint".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Host identity verification policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept any server key. Insecure; intended for trusted networks only.
    #[default]
    AcceptAny,
    /// Accept only the listed `SHA256:` fingerprints
    Pinned { fingerprints: Vec<String> },
    /// Record the first key seen per host and reject later changes
    TrustOnFirstUse { store: PathBuf },
}

/// Interactive session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Terminal type sent with the pseudo-terminal request
    pub term: String,
    /// Initial rows
    pub rows: u16,
    /// Initial columns
    pub cols: u16,
    /// Size of each remote output read, and so the largest binary frame
    pub read_chunk_size: usize,
    /// Grace period after the client disconnects before the connection is
    /// torn down even if the remote shell has not exited (0 = wait for it)
    #[serde(with = "optional_duration_secs")]
    pub disconnect_linger: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            rows: 40,
            cols: 80,
            read_chunk_size: 1024,
            disconnect_linger: Some(Duration::from_secs(10)),
        }
    }
}

impl SessionSettings {
    /// Initial terminal geometry, never below 1x1
    pub fn initial_size(&self) -> TerminalSize {
        TerminalSize::new(self.rows, self.cols)
    }
}

/// File transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Ceiling for uploads carried inline on the control channel
    pub max_inline_upload: u64,
    /// Ceiling for streamed HTTP upload request bodies
    pub max_http_upload: u64,
    /// Bytes of remote diagnostic output kept for error messages
    pub stderr_capture_limit: usize,
    /// Buffer size used when streaming downloads
    pub copy_buffer_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_inline_upload: 32 * 1024 * 1024,
            max_http_upload: 2 * 1024 * 1024 * 1024,
            stderr_capture_limit: 64 * 1024,
            copy_buffer_size: 32 * 1024,
        }
    }
}
