//! Core error types for the bastion gateway

use bastion_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the bastion crates
#[derive(Error, Debug)]
pub enum BastionError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transfer error
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Access token error
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while establishing or using a remote connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Network or transport negotiation failure
    #[error("Failed to connect to {addr}: {reason}")]
    Dial { addr: String, reason: String },

    /// Dial plus authentication did not finish in time
    #[error("Connection to {addr} timed out")]
    Timeout { addr: String },

    /// Host identity verification refused the server key
    #[error("Host key verification failed for {addr}")]
    HostKeyRejected { addr: String },

    /// Every offered credential was rejected
    #[error("Authentication failed for user {user}")]
    AuthenticationFailed { user: String },

    /// Private key bytes present but unparsable
    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    /// Neither a password nor a private key was supplied
    #[error("No authentication method available")]
    NoAuthMethods,

    /// Could not open a channel on an established connection
    #[error("Failed to open channel: {0}")]
    ChannelOpen(String),

    /// Pseudo-terminal or shell request refused
    #[error("Failed to start shell: {0}")]
    ShellRequest(String),

    /// Connection already closed
    #[error("Connection closed")]
    Closed,
}

/// Errors raised by a single file transfer
#[derive(Error, Debug)]
pub enum TransferError {
    /// Download path outside the allow-listed prefixes
    #[error("Access denied: downloads are only allowed from /home, /opt, and /tmp directories")]
    AccessDenied { path: String },

    /// Upload filename would escape the staging directory
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Inline payload above the configured ceiling
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },

    /// Payload could not be decoded
    #[error("Failed to decode file data: {0}")]
    InvalidPayload(#[from] ProtocolError),

    /// Connection-level failure while transferring
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Stream failure while copying
    #[error("Transfer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Remote command exited unsuccessfully
    #[error("Remote command failed (exit status {}): {}", exit_status_label(.exit_status), .stderr.trim())]
    RemoteFailed {
        exit_status: Option<u32>,
        stderr: String,
    },
}

fn exit_status_label(status: &Option<u32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

/// Access token rejected.
///
/// Deliberately carries no reason so callers cannot reveal which check
/// failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid access token")]
pub struct TokenError;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
