//! In-memory remote host and client channel used by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use bastion_core::error::ConnectionError;
use bastion_core::traits::{
    ClientSink, ClientSource, ExitWaiter, PtyRequest, PtyResizer, RemoteChannel,
    RemoteConnection, RemoteConnector, ShellChannel,
};
use bastion_core::CredentialBundle;
use bastion_protocol::{InboundFrame, OutboundFrame, TerminalSize};

const PIPE: usize = 64 * 1024;

/// Remote side of an interactive shell, driven by the test
pub struct ShellRemote {
    /// What the bridge wrote to the shell's stdin
    pub stdin: DuplexStream,
    pub stdout: Option<DuplexStream>,
    pub stderr: Option<DuplexStream>,
    pub exit: Option<oneshot::Sender<Option<u32>>>,
}

impl ShellRemote {
    /// Close output streams and report `status`
    pub fn exit(&mut self, status: Option<u32>) {
        self.stdout = None;
        self.stderr = None;
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(status);
        }
    }
}

struct RecordingResizer {
    resizes: Arc<Mutex<Vec<TerminalSize>>>,
}

#[async_trait]
impl PtyResizer for RecordingResizer {
    async fn resize(&self, size: TerminalSize) -> Result<(), ConnectionError> {
        self.resizes.lock().unwrap().push(size);
        Ok(())
    }
}

/// Connection to a simulated host with an in-memory file system.
///
/// Understands the three command shapes the gateway issues:
/// `cat > 'path'`, `cat 'path'` and `rm -f 'path'`. Writes to a path
/// containing `readonly` fail with exit status 1.
#[derive(Default)]
pub struct FakeConnection {
    pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub commands: Mutex<Vec<String>>,
    pub resizes: Arc<Mutex<Vec<TerminalSize>>>,
    pub pty_requests: Mutex<Vec<PtyRequest>>,
    pub closes: AtomicUsize,
    shell: Mutex<Option<ShellChannel>>,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Prepare the shell returned by the next `open_shell`
    pub fn prepare_shell(&self) -> ShellRemote {
        let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE);
        let (stdout_local, stdout_remote) = tokio::io::duplex(PIPE);
        let (stderr_local, stderr_remote) = tokio::io::duplex(PIPE);
        let (exit_tx, exit) = ExitWaiter::channel();

        let shell = ShellChannel {
            io: RemoteChannel {
                stdin: Box::new(stdin_local),
                stdout: Box::new(stdout_local),
                stderr: Box::new(stderr_local),
                exit,
            },
            resizer: Box::new(RecordingResizer {
                resizes: Arc::clone(&self.resizes),
            }),
        };
        *self.shell.lock().unwrap() = Some(shell);

        ShellRemote {
            stdin: stdin_remote,
            stdout: Some(stdout_remote),
            stderr: Some(stderr_remote),
            exit: Some(exit_tx),
        }
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

fn quoted_path(rest: &str) -> String {
    rest.trim().trim_matches('\'').to_string()
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn open_shell(&self, pty: &PtyRequest) -> Result<ShellChannel, ConnectionError> {
        self.pty_requests.lock().unwrap().push(pty.clone());
        self.shell
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ConnectionError::ShellRequest("shell request refused".to_string()))
    }

    async fn open_command(&self, command: &str) -> Result<RemoteChannel, ConnectionError> {
        self.commands.lock().unwrap().push(command.to_string());

        let (stdin_local, mut stdin_remote) = tokio::io::duplex(PIPE);
        let (stdout_local, mut stdout_remote) = tokio::io::duplex(PIPE);
        let (stderr_local, mut stderr_remote) = tokio::io::duplex(PIPE);
        let (exit_tx, exit) = ExitWaiter::channel();
        let files = Arc::clone(&self.files);
        let command = command.to_string();

        tokio::spawn(async move {
            let status = if let Some(rest) = command.strip_prefix("cat > ") {
                let path = quoted_path(rest);
                let mut content = Vec::new();
                let _ = stdin_remote.read_to_end(&mut content).await;
                if path.contains("readonly") {
                    files.lock().unwrap().insert(path.clone(), content);
                    let _ = stderr_remote
                        .write_all(format!("sh: {}: Permission denied\n", path).as_bytes())
                        .await;
                    1
                } else {
                    files.lock().unwrap().insert(path, content);
                    0
                }
            } else if let Some(rest) = command.strip_prefix("cat ") {
                let path = quoted_path(rest);
                let content = files.lock().unwrap().get(&path).cloned();
                match content {
                    Some(content) => {
                        let _ = stdout_remote.write_all(&content).await;
                        0
                    }
                    None => {
                        let _ = stderr_remote
                            .write_all(format!("cat: {}: No such file or directory\n", path).as_bytes())
                            .await;
                        1
                    }
                }
            } else if let Some(rest) = command.strip_prefix("rm -f ") {
                files.lock().unwrap().remove(&quoted_path(rest));
                0
            } else {
                127
            };
            drop(stdout_remote);
            drop(stderr_remote);
            let _ = exit_tx.send(Some(status));
        });

        Ok(RemoteChannel {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
            exit,
        })
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector that always hands out the same fake connection
pub struct FakeConnector {
    pub connection: Arc<FakeConnection>,
    pub attempts: AtomicUsize,
    pub last_credentials: Mutex<Option<CredentialBundle>>,
}

impl FakeConnector {
    pub fn new(connection: Arc<FakeConnection>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            attempts: AtomicUsize::new(0),
            last_credentials: Mutex::new(None),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<Arc<dyn RemoteConnection>, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_credentials.lock().unwrap() = Some(credentials.clone());
        Ok(self.connection.clone())
    }
}

/// Test side of a client channel
pub struct ClientEnd {
    pub input: Option<mpsc::UnboundedSender<io::Result<InboundFrame>>>,
    pub output: mpsc::UnboundedReceiver<OutboundFrame>,
    pub closed: Arc<Mutex<bool>>,
}

impl ClientEnd {
    pub fn send_text(&self, text: &str) {
        if let Some(input) = &self.input {
            input.send(Ok(InboundFrame::Text(text.to_string()))).unwrap();
        }
    }

    /// Simulate the client going away
    pub fn disconnect(&mut self) {
        self.input = None;
    }

    /// Next frame, failing the test after a generous timeout
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(Duration::from_secs(10), self.output.recv())
            .await
            .expect("timed out waiting for a client frame")
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

pub struct TestSink {
    output: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<Mutex<bool>>,
}

#[async_trait]
impl ClientSink for TestSink {
    async fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        self.output
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client gone"))
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

pub struct TestSource {
    input: mpsc::UnboundedReceiver<io::Result<InboundFrame>>,
}

#[async_trait]
impl ClientSource for TestSource {
    async fn recv(&mut self) -> Option<io::Result<InboundFrame>> {
        self.input.recv().await
    }
}

/// A connected client channel pair
pub fn client_channel() -> (ClientEnd, TestSource, TestSink) {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(Mutex::new(false));
    (
        ClientEnd {
            input: Some(input_tx),
            output: output_rx,
            closed: Arc::clone(&closed),
        },
        TestSource { input: input_rx },
        TestSink {
            output: output_tx,
            closed,
        },
    )
}

/// Poll `check` until it holds or a timeout elapses
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
