//! Graceful shutdown on SIGTERM and SIGINT.
//!
//! The coordinator cancels one token; everything holding a clone of it stops
//! accepting work and the daemon then disarms every schedule before exiting.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token that is cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGINT or SIGTERM, then cancel the shutdown token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT, shutting down");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down");
            }
            _ = self.token.cancelled() => {
                info!("Shutdown requested");
            }
        }

        self.trigger();
    }

    /// Begin shutdown without waiting for a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
