//! Single writer for the client channel
//!
//! Every producer (stdout and stderr relays, upload tasks) hands whole frames
//! to one task that owns the sink, so frames are never interleaved.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bastion_core::traits::ClientSink;
use bastion_core::SessionId;
use bastion_protocol::OutboundFrame;

/// Frames queued between producers and the writer.
///
/// Bounded so a slow client applies backpressure to the remote reads.
pub const FRAME_QUEUE_CAPACITY: usize = 256;

/// Cloneable handle for queueing frames to the client
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<OutboundFrame>,
}

impl FrameSender {
    /// Queue one frame. Returns `false` once the writer has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}

/// Spawn the writer task.
///
/// The task stops when `close` is cancelled or every sender is dropped;
/// either way it flushes frames already queued, then closes the sink.
pub fn spawn_client_writer<S>(
    mut sink: S,
    close: CancellationToken,
    session_id: SessionId,
) -> (FrameSender, JoinHandle<()>)
where
    S: ClientSink + 'static,
{
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(FRAME_QUEUE_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut healthy = true;
        loop {
            let frame = tokio::select! {
                biased;
                frame = rx.recv() => frame,
                _ = close.cancelled() => break,
            };
            let Some(frame) = frame else { break };
            if let Err(e) = sink.send(frame).await {
                tracing::warn!("[{}] Client write failed: {}", session_id, e);
                healthy = false;
                break;
            }
        }

        if healthy {
            while let Ok(frame) = rx.try_recv() {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        }
        rx.close();
        sink.close().await;
        tracing::debug!("[{}] Client writer stopped", session_id);
    });

    (FrameSender { tx }, handle)
}
