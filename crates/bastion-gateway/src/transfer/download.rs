//! Streamed downloads from allow-listed remote paths

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use bastion_core::error::TransferError;
use bastion_core::remote_path::{authorize_download, download_command, download_file_name};
use bastion_core::traits::{ExitWaiter, RemoteChannel, RemoteConnection, RemoteReader};

use super::{capture_stderr, check_exit, TransferLimits};

/// A download whose first chunk has already been read.
///
/// Failures that happen before any content is produced (missing file,
/// permission denied) surface from [`start_download`]; later failures
/// surface as a stream error.
pub struct DownloadStream {
    connection: Arc<dyn RemoteConnection>,
    path: String,
    file_name: String,
    first: Option<Bytes>,
    stdout: RemoteReader,
    diagnostics: Option<JoinHandle<String>>,
    exit: Option<ExitWaiter>,
    buffer_size: usize,
    finished: bool,
    close_connection: bool,
}

/// Authorize `path`, start the remote read and read the first chunk
pub async fn start_download(
    connection: Arc<dyn RemoteConnection>,
    path: &str,
    limits: &TransferLimits,
) -> Result<DownloadStream, TransferError> {
    authorize_download(path)?;

    let RemoteChannel {
        stdin,
        mut stdout,
        stderr,
        exit,
    } = connection.open_command(&download_command(path)).await?;
    drop(stdin);

    let diagnostics = tokio::spawn(capture_stderr(stderr, limits.stderr_capture_limit));
    let buffer_size = limits.copy_buffer_size.max(1);

    let mut first = BytesMut::with_capacity(buffer_size);
    let n = stdout.read_buf(&mut first).await?;

    let mut download = DownloadStream {
        connection,
        path: path.to_string(),
        file_name: download_file_name(path),
        first: None,
        stdout,
        diagnostics: Some(diagnostics),
        exit: Some(exit),
        buffer_size,
        finished: false,
        close_connection: false,
    };

    if n == 0 {
        // Nothing was produced: an empty file or an early failure.
        download.finish().await?;
    } else {
        download.first = Some(first.freeze());
    }

    tracing::debug!("Download of {} started", download.path);
    Ok(download)
}

impl DownloadStream {
    /// Suggested client-side file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Disconnect the connection once the download ends, or when the
    /// stream is dropped before the end
    pub fn close_connection_on_finish(mut self) -> Self {
        self.close_connection = true;
        self
    }

    async fn finish(&mut self) -> Result<(), TransferError> {
        self.finished = true;
        let exit_status = match self.exit.take() {
            Some(exit) => exit.wait().await,
            None => return Ok(()),
        };
        let stderr = match self.diagnostics.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if self.close_connection {
            self.connection.close().await;
        }
        let outcome = check_exit(exit_status, stderr);
        match &outcome {
            Ok(()) => tracing::info!("Download of {} complete", self.path),
            Err(e) => tracing::warn!("Download of {} failed: {}", self.path, e),
        }
        outcome
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
        if let Some(first) = self.first.take() {
            return Some(Ok(first));
        }
        if self.finished {
            return None;
        }
        let mut chunk = BytesMut::with_capacity(self.buffer_size);
        match self.stdout.read_buf(&mut chunk).await {
            Ok(0) => self.finish().await.err().map(Err),
            Ok(_) => Some(Ok(chunk.freeze())),
            Err(e) => {
                self.finished = true;
                if self.close_connection {
                    self.connection.close().await;
                }
                Some(Err(TransferError::Io(e)))
            }
        }
    }

    /// Stream of file content; a failure after content started is the
    /// final item
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        stream::unfold(self, |mut download| async move {
            download
                .next_chunk()
                .await
                .map(|item| (item.map_err(|e| io::Error::other(e.to_string())), download))
        })
    }

    /// Copy the whole file into `sink`; returns the byte count
    pub async fn copy_to<W>(mut self, sink: &mut W) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(total)
    }
}

impl Drop for DownloadStream {
    fn drop(&mut self) {
        if self.finished || !self.close_connection {
            return;
        }
        // The remote read keeps running until its connection goes away.
        tracing::debug!("Download of {} abandoned, closing connection", self.path);
        let connection = Arc::clone(&self.connection);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { connection.close().await });
        }
    }
}
