//! Control messages sent by the client
//!
//! Every text frame the client sends after the session starts is a flat JSON
//! record:
//!
//! ```json
//! {"type": "input" | "resize" | "upload", "data": "...", "cols": 0, "rows": 0,
//!  "filename": "...", "size": 0}
//! ```
//!
//! Only the fields relevant to `type` are read. Unknown `type` values decode
//! to no message and are ignored by the bridge.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Terminal dimensions
///
/// Always at least 1x1; constructing through [`TerminalSize::try_new`]
/// enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a terminal size, clamping each dimension to at least 1
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    /// Validate client-supplied geometry.
    ///
    /// Non-positive values and values beyond `u16::MAX` are rejected.
    pub fn try_new(rows: i64, cols: i64) -> Result<Self, ProtocolError> {
        let valid = |v: i64| (1..=i64::from(u16::MAX)).contains(&v);
        if !valid(rows) || !valid(cols) {
            return Err(ProtocolError::InvalidTerminalSize { rows, cols });
        }
        Ok(Self {
            rows: rows as u16,
            cols: cols as u16,
        })
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 40, cols: 80 }
    }
}

/// An inline upload carried on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Target filename, verbatim from the client
    pub filename: String,
    /// Base64-encoded file contents
    pub data: String,
    /// Size the client claims for the decoded payload
    pub declared_size: u64,
}

impl UploadRequest {
    /// Decode the base64 payload
    pub fn decode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|_| ProtocolError::InvalidEncoding { field: "file data" })
    }

    /// Upper bound on the decoded payload length, computed from the encoded
    /// length so oversized uploads can be refused before decoding.
    pub fn encoded_upper_bound(&self) -> u64 {
        (self.data.len() as u64).div_ceil(4) * 3
    }
}

/// A decoded client control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Raw keystrokes for the remote shell
    Input(Bytes),
    /// Window size change
    Resize(TerminalSize),
    /// Inline file upload
    Upload(UploadRequest),
}

/// Wire shape of a control frame
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawControlFrame {
    #[serde(rename = "type")]
    kind: String,
    data: String,
    cols: i64,
    rows: i64,
    filename: String,
    size: i64,
}

impl ControlMessage {
    /// Decode one control frame.
    ///
    /// Returns `Ok(None)` for well-formed frames with an unknown `type`.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let raw: RawControlFrame = serde_json::from_slice(frame)?;

        let message = match raw.kind.as_str() {
            "input" => Self::Input(Bytes::from(raw.data.into_bytes())),
            "resize" => Self::Resize(TerminalSize::try_new(raw.rows, raw.cols)?),
            "upload" => Self::Upload(UploadRequest {
                filename: raw.filename,
                data: raw.data,
                declared_size: raw.size.max(0) as u64,
            }),
            other => {
                tracing::debug!("Ignoring control frame with unknown type {:?}", other);
                return Ok(None);
            }
        };

        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_input_is_verbatim() {
        let msg = ControlMessage::decode(br#"{"type":"input","data":"ls -la\n"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg, ControlMessage::Input(Bytes::from_static(b"ls -la\n")));
    }

    #[test]
    fn test_decode_resize() {
        let msg = ControlMessage::decode(br#"{"type":"resize","rows":40,"cols":120}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg, ControlMessage::Resize(TerminalSize { rows: 40, cols: 120 }));
    }

    #[test]
    fn test_decode_resize_rejects_non_positive() {
        let err = ControlMessage::decode(br#"{"type":"resize","rows":0,"cols":80}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidTerminalSize { rows: 0, cols: 80 }
        ));

        assert!(ControlMessage::decode(br#"{"type":"resize","rows":24,"cols":-3}"#).is_err());
        assert!(ControlMessage::decode(br#"{"type":"resize","rows":70000,"cols":80}"#).is_err());
    }

    #[test]
    fn test_decode_upload() {
        let msg = ControlMessage::decode(
            br#"{"type":"upload","filename":"notes.txt","data":"aGVsbG8=","size":5}"#,
        )
        .unwrap()
        .unwrap();

        let ControlMessage::Upload(upload) = msg else {
            panic!("Expected upload message");
        };
        assert_eq!(upload.filename, "notes.txt");
        assert_eq!(upload.declared_size, 5);
        assert_eq!(upload.decode_payload().unwrap(), b"hello");
        assert!(upload.encoded_upper_bound() >= 5);
    }

    #[test]
    fn test_upload_bad_base64() {
        let upload = UploadRequest {
            filename: "x".to_string(),
            data: "not base64!".to_string(),
            declared_size: 0,
        };
        assert!(matches!(
            upload.decode_payload(),
            Err(ProtocolError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        assert!(ControlMessage::decode(br#"{"type":"ping"}"#).unwrap().is_none());
        assert!(ControlMessage::decode(br#"{}"#).unwrap().is_none());
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            ControlMessage::decode(b"hello"),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(ControlMessage::decode(br#"{"type":"resize","rows":"a"}"#).is_err());
    }

    #[test]
    fn test_terminal_size_new_clamps() {
        assert_eq!(TerminalSize::new(0, 0), TerminalSize { rows: 1, cols: 1 });
        assert_eq!(TerminalSize::default(), TerminalSize { rows: 40, cols: 80 });
    }
}
