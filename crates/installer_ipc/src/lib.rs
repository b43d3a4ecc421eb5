//! Single-instance IPC: wire framing, a loopback-only server, and the
//! client that probes for and talks to it.
//!
//! A second invocation of the tool uses [`client::IpcClient`] to hand its
//! command-line arguments to the first instance's [`server::IpcServer`] and
//! exit; the first instance executes them through an [`server::IpcHandler`]
//! it supplies (the UI-facing controller in `installer_app`).

mod client;
pub mod error;
mod framing;
mod line_reader;
mod server;

pub use client::IpcClient;
pub use error::IpcError;
pub use framing::{IpcMessage, MessageType};
pub use server::{IpcHandler, IpcServer, IpcServerBuilder};
