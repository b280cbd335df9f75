//! bastion-core: Core abstractions and configuration for the bastion gateway
//!
//! This crate provides the configuration, error taxonomy, credential and
//! access-token handling, remote path policy and the transport seams shared
//! by the gateway and the command-line tool.

pub mod config;
pub mod credentials;
pub mod error;
pub mod remote_path;
pub mod session;
pub mod time;
pub mod token;
pub mod traits;

pub use credentials::CredentialBundle;
pub use error::{BastionError, ConnectionError, TokenError, TransferError};
pub use session::{RemoteSession, SessionId, SessionState};
pub use token::AccessTokenCodec;
