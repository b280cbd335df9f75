//! File transfer over one-shot remote commands
//!
//! Each transfer opens its own channel on an established connection, so
//! transfers run concurrently with an interactive shell.

mod download;
mod upload;

pub use download::{start_download, DownloadStream};
pub use upload::{upload_inline, upload_stream};

use serde::Serialize;
use tokio::io::AsyncReadExt;

use bastion_core::config::TransferSettings;
use bastion_core::error::TransferError;
use bastion_core::traits::RemoteReader;
use bastion_protocol::UploadResponse;

/// Limits applied to every transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferLimits {
    /// Ceiling for inline (control channel) uploads, decoded bytes
    pub max_inline_upload: u64,
    /// Remote diagnostics kept for error messages
    pub stderr_capture_limit: usize,
    /// Read size for streamed copies
    pub copy_buffer_size: usize,
}

impl From<&TransferSettings> for TransferLimits {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            max_inline_upload: settings.max_inline_upload,
            stderr_capture_limit: settings.stderr_capture_limit,
            copy_buffer_size: settings.copy_buffer_size,
        }
    }
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self::from(&TransferSettings::default())
    }
}

/// Outcome of one transfer as reported to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TransferResult {
    pub fn success(path: impl Into<String>) -> Self {
        Self {
            success: true,
            path: path.into(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            path: String::new(),
            error: error.into(),
        }
    }

    /// Control channel acknowledgement carrying the same outcome
    pub fn to_upload_response(&self) -> UploadResponse {
        if self.success {
            UploadResponse::success(self.path.clone())
        } else {
            UploadResponse::failure(self.error.clone())
        }
    }
}

impl From<Result<String, TransferError>> for TransferResult {
    fn from(outcome: Result<String, TransferError>) -> Self {
        match outcome {
            Ok(path) => Self::success(path),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Read a diagnostic stream to its end, keeping at most `limit` bytes
pub(crate) async fn capture_stderr(mut reader: RemoteReader, limit: usize) -> String {
    let mut captured = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}

/// Discard a stream so the remote side never blocks on it
pub(crate) async fn drain(mut reader: RemoteReader) {
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
}

/// Map the remote exit status to success or a reported failure
pub(crate) fn check_exit(exit_status: Option<u32>, stderr: String) -> Result<(), TransferError> {
    if exit_status == Some(0) {
        Ok(())
    } else {
        Err(TransferError::RemoteFailed {
            exit_status,
            stderr,
        })
    }
}
