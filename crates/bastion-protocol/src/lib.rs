//! bastion-protocol: Client-channel wire protocol for the bastion gateway
//!
//! This crate defines the frames exchanged between the browser-facing
//! duplex channel and the session bridge: JSON control frames from the
//! client, raw binary terminal output and JSON acknowledgements back to it,
//! and the pipe-delimited bootstrap record that may precede a session.

pub mod bootstrap;
pub mod error;
pub mod frame;
pub mod message;

pub use bootstrap::BootstrapRecord;
pub use error::ProtocolError;
pub use frame::{InboundFrame, OutboundFrame, UploadResponse};
pub use message::{ControlMessage, TerminalSize};
