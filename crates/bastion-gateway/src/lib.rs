//! bastion-gateway: browser terminal to SSH bridge
//!
//! The gateway accepts browser connections, establishes SSH connections on
//! their behalf and relays terminal traffic and file transfers between the
//! two.

pub mod bridge;
pub mod registry;
pub mod server;
pub mod ssh;
pub mod state;
pub mod transfer;

pub use bridge::{BridgeSettings, EndReason, SessionBridge, SessionOutcome};
pub use registry::SessionRegistry;
pub use ssh::SshConnector;
pub use state::GatewayState;
pub use transfer::{TransferLimits, TransferResult};
