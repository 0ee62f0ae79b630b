//! Control socket client used by the `watchman` CLI.

use super::protocol::{AddPayload, Request, Response};
use crate::task::BackupTask;
use crate::utils::errors::{DaemonError, Result};
use futures_util::{SinkExt, StreamExt};
use std::path::Path;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};

use super::server::MAX_LINE_LENGTH;

pub struct IpcClient {
    framed: Framed<UnixStream, LinesCodec>,
}

impl IpcClient {
    pub async fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            DaemonError::Daemon(format!(
                "cannot reach watchman daemon at {} ({}); is watchmand running?",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        })
    }

    /// Send one request and wait for its response.
    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        let line = serde_json::to_string(request)?;
        self.framed
            .send(line)
            .await
            .map_err(|e| DaemonError::Protocol(e.to_string()))?;

        match self.framed.next().await {
            Some(Ok(line)) => Ok(serde_json::from_str(&line)?),
            Some(Err(e)) => Err(DaemonError::Protocol(e.to_string())),
            None => Err(DaemonError::Protocol(
                "daemon closed the connection without responding".to_string(),
            )),
        }
    }

    pub async fn add(&mut self, payload: AddPayload) -> Result<()> {
        self.call(&Request::Add(payload)).await.map(|_| ())
    }

    pub async fn list(&mut self) -> Result<Vec<BackupTask>> {
        let response = self.call(&Request::List).await?;
        Ok(response.data.unwrap_or_default())
    }

    pub async fn stop(&mut self, name: &str) -> Result<()> {
        self.call(&Request::Stop {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn delete(&mut self, name: &str) -> Result<()> {
        self.call(&Request::Delete {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Like [`send`](Self::send), but a `success: false` reply becomes an error.
    async fn call(&mut self, request: &Request) -> Result<Response> {
        let response = self.send(request).await?;
        if response.success {
            Ok(response)
        } else {
            Err(DaemonError::Daemon(
                response
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_without_daemon() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let err = IpcClient::connect(&dir.path().join("absent.sock"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("is watchmand running"));
        Ok(())
    }
}
