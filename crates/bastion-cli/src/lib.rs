//! bastion command-line library
//!
//! Shared pieces of the `bastion` binary, exposed for testing.

pub mod commands;
pub mod output;
