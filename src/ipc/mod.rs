//! IPC module for daemon-client communication

mod protocol;
mod server;

pub use protocol::DaemonStatus;
pub use server::Server;
