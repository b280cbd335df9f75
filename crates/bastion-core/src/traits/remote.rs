//! Remote transport seam
//!
//! The gateway does not speak the remote-execution protocol directly; it
//! relies on an authenticated connection that can open independent channels,
//! either an interactive shell with a pseudo-terminal or a one-shot command.
//! Each channel exposes its standard streams as plain async I/O.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use bastion_protocol::TerminalSize;

use crate::credentials::CredentialBundle;
use crate::error::ConnectionError;

/// Readable half of a remote stream
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable half of a remote stream
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Pseudo-terminal parameters for an interactive shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// Terminal type identifier, e.g. `xterm-256color`
    pub term: String,
    /// Initial geometry
    pub size: TerminalSize,
}

/// Resolves to the remote command's exit status once the channel closes
#[derive(Debug)]
pub struct ExitWaiter(oneshot::Receiver<Option<u32>>);

impl ExitWaiter {
    /// Create a waiter and the sender that completes it
    pub fn channel() -> (oneshot::Sender<Option<u32>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// Wait for the exit status.
    ///
    /// `None` if the remote closed without reporting one.
    pub async fn wait(self) -> Option<u32> {
        self.0.await.ok().flatten()
    }
}

/// Standard streams of one remote channel
pub struct RemoteChannel {
    /// Remote standard input; shutting it down sends end-of-input
    pub stdin: RemoteWriter,
    /// Remote standard output
    pub stdout: RemoteReader,
    /// Remote standard error
    pub stderr: RemoteReader,
    /// Exit status
    pub exit: ExitWaiter,
}

/// Window-size-change requests for an interactive shell
#[async_trait]
pub trait PtyResizer: Send + Sync {
    /// Send a window-size-change request with exactly this geometry
    async fn resize(&self, size: TerminalSize) -> Result<(), ConnectionError>;
}

/// An interactive shell channel
pub struct ShellChannel {
    /// Shell standard streams
    pub io: RemoteChannel,
    /// Resize handle, usable concurrently with the streams
    pub resizer: Box<dyn PtyResizer>,
}

/// An open, authenticated connection to a remote host.
///
/// Channels are independently multiplexed; callers may open several
/// concurrently without external locking.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Request a pseudo-terminal and start an interactive shell
    async fn open_shell(&self, pty: &PtyRequest) -> Result<ShellChannel, ConnectionError>;

    /// Start one remote command on a fresh channel
    async fn open_command(&self, command: &str) -> Result<RemoteChannel, ConnectionError>;

    /// Disconnect. Idempotent.
    async fn close(&self);
}

/// Establishes authenticated connections
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Dial and authenticate. Never retries.
    async fn connect(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<Arc<dyn RemoteConnection>, ConnectionError>;
}
