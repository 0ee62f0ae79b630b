//! Unix socket boundary between the `watchman` CLI and the daemon.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{AddPayload, Request, Response};
pub use server::IpcServer;

/// Default control socket location
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/watchman.sock";
