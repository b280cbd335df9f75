//! Frames carried on the client-facing duplex channel

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A frame received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Bytes),
}

impl InboundFrame {
    /// Raw payload bytes regardless of frame kind
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Payload as text, for frames that must be UTF-8 (the bootstrap record)
    pub fn into_text(self) -> Result<String, ProtocolError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Binary(data) => {
                String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
            }
        }
    }
}

/// A frame sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Raw remote terminal output, no envelope
    Binary(Bytes),
    /// Text frame (JSON acknowledgements, diagnostics)
    Text(String),
}

impl OutboundFrame {
    /// Human-readable diagnostic shown in the client terminal
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::Text(format!("Error: {}\r\n", reason))
    }

    /// Encode an upload acknowledgement
    pub fn upload_response(response: &UploadResponse) -> Self {
        // Serializing a struct of strings and bools cannot fail
        let json = serde_json::to_string(response).unwrap_or_default();
        Self::Text(json)
    }
}

/// Acknowledgement for an inline upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Always `upload_response`
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the file was staged
    pub success: bool,
    /// Remote staging path on success
    pub path: String,
    /// Failure description
    pub error: String,
}

impl UploadResponse {
    /// Frame type tag
    pub const KIND: &'static str = "upload_response";

    /// Successful upload
    pub fn success(path: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            success: true,
            path: path.into(),
            error: String::new(),
        }
    }

    /// Failed upload
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            success: false,
            path: String::new(),
            error: error.into(),
        }
    }
}
