//! Session bridge
//!
//! Couples one client channel to one remote shell. Four concurrent workers
//! run per session:
//!
//! - stdout relay: remote output to client frames; its end is the end of
//!   the session
//! - stderr relay: same, for diagnostic output
//! - control worker: client frames to keystrokes, resizes and uploads
//! - client writer: the only task that writes to the client
//!
//! Teardown runs exactly once no matter which path reaches it first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bastion_core::config::GatewayConfig;
use bastion_core::traits::{
    ClientSink, ClientSource, PtyRequest, PtyResizer, RemoteChannel, RemoteConnection,
    RemoteReader, RemoteWriter, ShellChannel,
};
use bastion_core::{CredentialBundle, RemoteSession, SessionId, SessionState};
use bastion_protocol::message::UploadRequest;
use bastion_protocol::{ControlMessage, OutboundFrame, TerminalSize};

use super::writer::{spawn_client_writer, FrameSender};
use crate::transfer::{upload_inline, TransferLimits, TransferResult};

/// Per-session settings
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Terminal type requested for the pty
    pub term: String,
    /// Initial terminal geometry
    pub initial_size: TerminalSize,
    /// Read size for the output relays
    pub read_chunk_size: usize,
    /// How long the shell may outlive its client (`None` = until it exits)
    pub disconnect_linger: Option<Duration>,
    /// Limits for inline uploads
    pub transfer: TransferLimits,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for BridgeSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            term: config.session.term.clone(),
            initial_size: config.session.initial_size(),
            read_chunk_size: config.session.read_chunk_size.max(1),
            disconnect_linger: config.session.disconnect_linger,
            transfer: TransferLimits::from(&config.transfer),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Remote output reached end of stream
    ShellExited,
    /// Client left and the linger period ran out
    ClientDisconnected,
    /// Cancelled from outside (gateway shutdown)
    Cancelled,
    /// The shell could not be started
    StartFailed,
}

/// Result of [`SessionBridge::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: EndReason,
    /// Remote exit status, when the shell reported one
    pub exit_status: Option<u32>,
}

/// Bridges one client channel to one remote shell
pub struct SessionBridge {
    connection: Arc<dyn RemoteConnection>,
    session: Arc<RemoteSession>,
    settings: BridgeSettings,
    cancel: CancellationToken,
}

impl SessionBridge {
    /// Create a bridge over an authenticated connection
    pub fn new(
        connection: Arc<dyn RemoteConnection>,
        credentials: &CredentialBundle,
        settings: BridgeSettings,
    ) -> Self {
        let session = Arc::new(RemoteSession::new(credentials, settings.initial_size));
        Self {
            connection,
            session,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Shared session record
    pub fn session(&self) -> Arc<RemoteSession> {
        Arc::clone(&self.session)
    }

    /// Token that ends the session when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion.
    ///
    /// Returns once every resource has been released and the session is
    /// `Closed`.
    pub async fn run<Src, Snk>(self, source: Src, sink: Snk) -> SessionOutcome
    where
        Src: ClientSource + 'static,
        Snk: ClientSink + 'static,
    {
        let id = self.session.id;
        let close_client = CancellationToken::new();
        let (frames, writer) = spawn_client_writer(sink, close_client.clone(), id);
        let teardown = Teardown {
            done: AtomicBool::new(false),
            session: Arc::clone(&self.session),
            connection: Arc::clone(&self.connection),
            close_client,
            writer: Mutex::new(Some(writer)),
        };

        let pty = PtyRequest {
            term: self.settings.term.clone(),
            size: self.settings.initial_size,
        };
        let ShellChannel { io, resizer } = match self.connection.open_shell(&pty).await {
            Ok(shell) => shell,
            Err(e) => {
                tracing::error!("[{}] Failed to start shell: {}", id, e);
                frames.send(OutboundFrame::error(&e)).await;
                drop(frames);
                teardown.run().await;
                return SessionOutcome {
                    reason: EndReason::StartFailed,
                    exit_status: None,
                };
            }
        };
        let RemoteChannel {
            stdin,
            stdout,
            stderr,
            exit,
        } = io;

        self.session.advance(SessionState::Active);
        tracing::info!(
            "[{}] Session active: {}@{}",
            id,
            self.session.user,
            self.session.host
        );

        let chunk = self.settings.read_chunk_size;
        let mut stdout_task = tokio::spawn(relay_output(stdout, frames.clone(), chunk, id, "stdout"));
        let stderr_task = tokio::spawn(relay_output(stderr, frames.clone(), chunk, id, "stderr"));

        let client_gone = CancellationToken::new();
        let control = ControlWorker {
            id,
            stdin,
            resizer,
            session: Arc::clone(&self.session),
            uploads: UploadDispatcher {
                connection: Arc::clone(&self.connection),
                frames,
                limits: self.settings.transfer,
            },
            client_gone: client_gone.clone(),
        };
        let control_task = tokio::spawn(control.run(source));

        let reason = tokio::select! {
            _ = &mut stdout_task => EndReason::ShellExited,
            _ = self.cancel.cancelled() => EndReason::Cancelled,
            _ = linger(&client_gone, self.settings.disconnect_linger) => EndReason::ClientDisconnected,
        };
        self.session.advance(SessionState::Closing);
        tracing::debug!("[{}] Session ending: {:?}", id, reason);

        let exit_status = if reason == EndReason::ShellExited {
            let (status, _) = tokio::join!(exit.wait(), stderr_task);
            status
        } else {
            stdout_task.abort();
            stderr_task.abort();
            None
        };

        teardown.run().await;
        control_task.abort();

        tracing::info!(
            "[{}] Session closed (exit status: {:?})",
            id,
            exit_status
        );
        SessionOutcome {
            reason,
            exit_status,
        }
    }
}

/// Resolve once the client is gone and the linger period has elapsed
async fn linger(client_gone: &CancellationToken, period: Option<Duration>) {
    client_gone.cancelled().await;
    match period {
        Some(period) => tokio::time::sleep(period).await,
        None => std::future::pending::<()>().await,
    }
}

/// Exactly-once release of the client channel and the connection
struct Teardown {
    done: AtomicBool,
    session: Arc<RemoteSession>,
    connection: Arc<dyn RemoteConnection>,
    close_client: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Teardown {
    /// Returns `true` for the call that performed the teardown
    async fn run(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.session.advance(SessionState::Closing);

        self.close_client.cancel();
        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        self.connection.close().await;
        self.session.advance(SessionState::Closed);
        true
    }
}

/// Relay one remote output stream to the client.
///
/// Each read of up to `chunk_size` bytes becomes one binary frame. Ends on
/// end-of-stream or a read fault.
async fn relay_output(
    mut reader: RemoteReader,
    frames: FrameSender,
    chunk_size: usize,
    id: SessionId,
    stream: &'static str,
) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("[{}] Remote {} closed", id, stream);
                return;
            }
            Ok(n) => {
                // Keep reading after the writer stops so the remote never blocks.
                frames
                    .send(OutboundFrame::Binary(Bytes::copy_from_slice(&buf[..n])))
                    .await;
            }
            Err(e) => {
                tracing::warn!("[{}] Error reading remote {}: {}", id, stream, e);
                return;
            }
        }
    }
}

/// Starts inline uploads on their own channels
struct UploadDispatcher {
    connection: Arc<dyn RemoteConnection>,
    frames: FrameSender,
    limits: TransferLimits,
}

impl UploadDispatcher {
    /// Run the upload in the background; its acknowledgement goes through
    /// the client writer like any other frame
    fn dispatch(&self, id: SessionId, request: UploadRequest) {
        let connection = Arc::clone(&self.connection);
        let frames = self.frames.clone();
        let limits = self.limits;
        tokio::spawn(async move {
            tracing::info!(
                "[{}] Upload of {:?} ({} bytes declared)",
                id,
                request.filename,
                request.declared_size
            );
            let result = TransferResult::from(
                upload_inline(connection.as_ref(), &request, &limits).await,
            );
            let frame = OutboundFrame::upload_response(&result.to_upload_response());
            if !frames.send(frame).await {
                tracing::debug!("[{}] Upload finished after client left", id);
            }
        });
    }
}

/// Applies client control messages to the shell
struct ControlWorker {
    id: SessionId,
    stdin: RemoteWriter,
    resizer: Box<dyn PtyResizer>,
    session: Arc<RemoteSession>,
    uploads: UploadDispatcher,
    client_gone: CancellationToken,
}

impl ControlWorker {
    async fn run<Src: ClientSource>(mut self, mut source: Src) {
        loop {
            let frame = match source.recv().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    tracing::debug!("[{}] Client read failed: {}", self.id, e);
                    break;
                }
                None => {
                    tracing::debug!("[{}] Client closed the channel", self.id);
                    break;
                }
            };

            let message = match ControlMessage::decode(frame.payload()) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("[{}] Dropping control frame: {}", self.id, e);
                    continue;
                }
            };

            match message {
                ControlMessage::Input(data) => {
                    let written = match self.stdin.write_all(&data).await {
                        Ok(()) => self.stdin.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        tracing::warn!("[{}] Error writing to remote stdin: {}", self.id, e);
                        break;
                    }
                }
                ControlMessage::Resize(size) => match self.resizer.resize(size).await {
                    Ok(()) => {
                        self.session.set_size(size);
                        tracing::debug!(
                            "[{}] Resized to {}x{}",
                            self.id,
                            size.cols,
                            size.rows
                        );
                    }
                    Err(e) => tracing::warn!("[{}] Resize failed: {}", self.id, e),
                },
                ControlMessage::Upload(request) => self.uploads.dispatch(self.id, request),
            }
        }

        // The shell may keep running; it only loses its input.
        if let Err(e) = self.stdin.shutdown().await {
            tracing::debug!("[{}] Closing remote stdin failed: {}", self.id, e);
        }
        self.client_gone.cancel();
    }
}
