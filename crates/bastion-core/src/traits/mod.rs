//! Core trait definitions

mod client;
mod remote;

pub use client::{ClientSink, ClientSource};
pub use remote::{
    ExitWaiter, PtyRequest, PtyResizer, RemoteChannel, RemoteConnection, RemoteConnector,
    RemoteReader, RemoteWriter, ShellChannel,
};
