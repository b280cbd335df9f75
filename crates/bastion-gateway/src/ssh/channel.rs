//! Adapts a russh channel to plain async streams
//!
//! A pump task owns the channel. It forwards remote output into in-memory
//! pipes, forwards the stdin pipe to the remote side and serialises
//! window-change requests with the stream traffic.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use bastion_core::error::ConnectionError;
use bastion_core::traits::{ExitWaiter, PtyResizer, RemoteChannel, ShellChannel};
use bastion_protocol::TerminalSize;

/// In-memory pipe capacity per stream
const PIPE_CAPACITY: usize = 64 * 1024;

/// Largest stdin chunk forwarded in one channel data message
const STDIN_CHUNK_SIZE: usize = 32 * 1024;

/// Pending window-change requests per channel
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Terminal modes sent with every pty request: echo on, 14.4 kbaud
pub(crate) const TERMINAL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

enum ChannelCommand {
    WindowChange {
        size: TerminalSize,
        reply: oneshot::Sender<Result<(), russh::Error>>,
    },
}

/// Wait for the reply to a request sent with `want_reply = true`
pub(crate) async fn await_reply(channel: &mut Channel<Msg>, what: &str) -> Result<(), String> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err(format!("{} request refused", what)),
            Some(ChannelMsg::Close) | None => {
                return Err(format!("channel closed before {} reply", what))
            }
            Some(other) => {
                tracing::trace!("Ignoring {:?} while waiting for {} reply", other, what);
            }
        }
    }
}

/// Wrap a channel running an interactive shell
pub(crate) fn shell_channel(channel: Channel<Msg>) -> ShellChannel {
    let (io, commands) = spawn_pump(channel);
    ShellChannel {
        io,
        resizer: Box::new(ChannelResizer { commands }),
    }
}

/// Wrap a channel running a one-shot command
pub(crate) fn command_channel(channel: Channel<Msg>) -> RemoteChannel {
    let (io, _commands) = spawn_pump(channel);
    io
}

fn spawn_pump(channel: Channel<Msg>) -> (RemoteChannel, mpsc::Sender<ChannelCommand>) {
    let (stdout_tx, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (stdin_tx, stdin_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let (exit_tx, exit) = ExitWaiter::channel();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let status = pump(channel, stdout_tx, stderr_tx, stdin_rx, command_rx).await;
        let _ = exit_tx.send(status);
    });

    let io = RemoteChannel {
        stdin: Box::new(stdin_tx),
        stdout: Box::new(stdout_rx),
        stderr: Box::new(stderr_rx),
        exit,
    };
    (io, command_tx)
}

async fn forward(pipe: &mut Option<DuplexStream>, data: &[u8]) {
    if let Some(writer) = pipe.as_mut() {
        if writer.write_all(data).await.is_err() {
            // Reader went away; discard the rest of this stream.
            *pipe = None;
        }
    }
}

async fn pump(
    mut channel: Channel<Msg>,
    stdout: DuplexStream,
    stderr: DuplexStream,
    mut stdin: DuplexStream,
    mut commands: mpsc::Receiver<ChannelCommand>,
) -> Option<u32> {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    let mut exit_status = None;
    let mut stdin_open = true;
    let mut commands_open = true;
    let mut buf = vec![0u8; STDIN_CHUNK_SIZE];

    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => forward(&mut stdout, &data).await,
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => forward(&mut stderr, &data).await,
                Some(ChannelMsg::ExitStatus { exit_status: code }) => {
                    tracing::debug!("Remote exit status {}", code);
                    exit_status = Some(code);
                }
                Some(ChannelMsg::Eof) => {
                    stdout = None;
                    stderr = None;
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    if let Err(e) = channel.eof().await {
                        tracing::debug!("Failed to send end-of-input: {}", e);
                    }
                }
                Ok(n) => {
                    if let Err(e) = channel.data(&buf[..n]).await {
                        tracing::debug!("Failed to forward input: {}", e);
                        stdin_open = false;
                    }
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(ChannelCommand::WindowChange { size, reply }) => {
                    let result = channel
                        .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                        .await;
                    let _ = reply.send(result);
                }
                None => commands_open = false,
            },
        }
    }

    exit_status
}

struct ChannelResizer {
    commands: mpsc::Sender<ChannelCommand>,
}

#[async_trait]
impl PtyResizer for ChannelResizer {
    async fn resize(&self, size: TerminalSize) -> Result<(), ConnectionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ChannelCommand::WindowChange { size, reply })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        response
            .await
            .map_err(|_| ConnectionError::Closed)?
            .map_err(|e| ConnectionError::ShellRequest(e.to_string()))
    }
}
