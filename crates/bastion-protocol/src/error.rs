//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding client-channel frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Control frame was not valid JSON for the expected record
    #[error("Malformed control frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// Terminal geometry outside the accepted range
    #[error("Invalid terminal size: {rows}x{cols}")]
    InvalidTerminalSize { rows: i64, cols: i64 },

    /// Bootstrap record did not carry the required fields
    #[error("Missing host or user")]
    MissingCredentials,

    /// A base64 field could not be decoded
    #[error("Invalid {field} encoding")]
    InvalidEncoding { field: &'static str },

    /// Frame payload was not valid UTF-8 where text was required
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}
