//! Uploads into the remote staging directory

use tokio::io::{AsyncRead, AsyncWriteExt};

use bastion_core::error::TransferError;
use bastion_core::remote_path::{shell_quote, staging_path, upload_command};
use bastion_core::traits::{RemoteChannel, RemoteConnection};
use bastion_protocol::message::UploadRequest;

use super::{capture_stderr, check_exit, drain, TransferLimits};

/// Stream `source` into `/tmp/<filename>` on the remote host.
///
/// The whole source is written, end-of-input is signalled and the remote
/// command's exit status decides the outcome. A failed upload removes
/// whatever partial file it left behind. Returns the remote path.
pub async fn upload_stream<R>(
    connection: &dyn RemoteConnection,
    filename: &str,
    source: &mut R,
    limits: &TransferLimits,
) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let path = staging_path(filename)?;

    let RemoteChannel {
        mut stdin,
        stdout,
        stderr,
        exit,
    } = connection.open_command(&upload_command(&path)).await?;

    let diagnostics = tokio::spawn(capture_stderr(stderr, limits.stderr_capture_limit));
    let discard = tokio::spawn(drain(stdout));

    let copied = tokio::io::copy(source, &mut stdin).await;
    let finished = stdin.shutdown().await;
    drop(stdin);

    let exit_status = exit.wait().await;
    let stderr = diagnostics.await.unwrap_or_default();
    let _ = discard.await;

    let outcome = match (copied, finished) {
        (Ok(bytes), Ok(())) => check_exit(exit_status, stderr).map(|_| bytes),
        (Err(e), _) | (_, Err(e)) => Err(TransferError::Io(e)),
    };

    match outcome {
        Ok(bytes) => {
            tracing::info!("Uploaded {} bytes to {}", bytes, path);
            Ok(path)
        }
        Err(e) => {
            tracing::warn!("Upload to {} failed: {}", path, e);
            remove_partial(connection, &path).await;
            Err(e)
        }
    }
}

/// Upload a payload carried inline on the control channel
pub async fn upload_inline(
    connection: &dyn RemoteConnection,
    request: &UploadRequest,
    limits: &TransferLimits,
) -> Result<String, TransferError> {
    staging_path(&request.filename)?;

    let max = limits.max_inline_upload;
    // Decoded length is within two bytes of the base64 upper bound.
    let lower_bound = request.encoded_upper_bound().saturating_sub(2);
    if request.declared_size > max || lower_bound > max {
        return Err(TransferError::PayloadTooLarge {
            size: request.declared_size.max(lower_bound),
            max,
        });
    }

    let payload = request.decode_payload()?;
    if payload.len() as u64 > max {
        return Err(TransferError::PayloadTooLarge {
            size: payload.len() as u64,
            max,
        });
    }

    upload_stream(connection, &request.filename, &mut payload.as_slice(), limits).await
}

async fn remove_partial(connection: &dyn RemoteConnection, path: &str) {
    let command = format!("rm -f {}", shell_quote(path));
    match connection.open_command(&command).await {
        Ok(channel) => {
            drop(channel.stdin);
            let _ = channel.exit.wait().await;
        }
        Err(e) => tracing::debug!("Could not remove partial upload {}: {}", path, e),
    }
}
