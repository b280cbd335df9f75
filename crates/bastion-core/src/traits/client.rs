//! Client-facing duplex channel seam

use async_trait::async_trait;

use bastion_protocol::{InboundFrame, OutboundFrame};

/// Writing side of the client channel.
///
/// Each `send` delivers exactly one frame. Implementations are driven by a
/// single writer task, so they need not be shareable.
#[async_trait]
pub trait ClientSink: Send {
    /// Deliver one frame
    async fn send(&mut self, frame: OutboundFrame) -> std::io::Result<()>;

    /// Close the channel
    async fn close(&mut self);
}

/// Reading side of the client channel
#[async_trait]
pub trait ClientSource: Send {
    /// Next frame, or `None` once the client has closed the channel
    async fn recv(&mut self) -> Option<std::io::Result<InboundFrame>>;
}
