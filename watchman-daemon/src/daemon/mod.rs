//! Daemon process plumbing.

pub mod pidfile;
pub mod shutdown;

pub use pidfile::PidFile;
pub use shutdown::ShutdownCoordinator;
