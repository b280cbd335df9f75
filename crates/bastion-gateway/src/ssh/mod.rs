//! SSH transport built on russh

mod channel;
mod connector;
pub mod host_keys;

pub use connector::{ClientHandler, SshConnection, SshConnector};
pub use host_keys::{verifier_from_policy, AcceptAnyHostKey, HostKeyVerifier, PinnedHostKeys, TrustOnFirstUse};
