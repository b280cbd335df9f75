//! Client channel to remote shell bridging

mod session;
mod writer;

pub use session::{BridgeSettings, EndReason, SessionBridge, SessionOutcome};
pub use writer::{spawn_client_writer, FrameSender, FRAME_QUEUE_CAPACITY};
