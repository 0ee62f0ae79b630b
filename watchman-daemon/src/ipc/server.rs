//! Control socket server.
//!
//! Each accepted connection is served on its own task and may carry any
//! number of requests. Manager errors become `success: false` responses;
//! only socket-level failures end a connection.

use super::protocol::{AddPayload, Request, Response};
use crate::task::{NewTask, Schedule, TaskManager};
use crate::utils::errors::{DaemonError, Result};
use futures_util::{SinkExt, StreamExt};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest request line accepted from a client
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

const SOCKET_MODE: u32 = 0o666;

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    manager: TaskManager,
}

impl IpcServer {
    /// Bind the control socket, replacing a stale socket file left by a
    /// previous daemon.
    pub fn bind(path: impl Into<PathBuf>, manager: TaskManager) -> Result<Self> {
        let path = path.into();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
        info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            manager,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept clients until `shutdown` is cancelled, then remove the socket file.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Control socket shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let manager = self.manager.clone();
                            let shutdown = shutdown.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, manager, shutdown).await {
                                    warn!("Client connection ended with error: {}", e);
                                }
                            });
                        }
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove socket {}: {}", self.path.display(), e);
        }
        Ok(())
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Err(DaemonError::Config(format!(
            "{} exists and is not a socket",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn handle_connection(
    stream: UnixStream,
    manager: TaskManager,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Err(DaemonError::Protocol(e.to_string())),
                None => break,
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&manager, request).await,
            Err(e) => {
                debug!("Rejecting malformed request: {}", e);
                Response::error(format!("invalid request: {}", e))
            }
        };

        let encoded = serde_json::to_string(&response)?;
        framed
            .send(encoded)
            .await
            .map_err(|e| DaemonError::Protocol(e.to_string()))?;
    }

    debug!("Client disconnected");
    Ok(())
}

/// Execute one request against the task manager.
pub async fn dispatch(manager: &TaskManager, request: Request) -> Response {
    match request {
        Request::Add(payload) => match new_task(payload) {
            Ok(params) => match manager.add_task(params).await {
                Ok(_) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            },
            Err(message) => Response::error(message),
        },
        Request::List => Response::with_tasks(manager.list_tasks().await),
        Request::Stop { name } => {
            if name.trim().is_empty() {
                return Response::error("task name is required");
            }
            match manager.stop_task(&name).await {
                Ok(_) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            }
        }
        Request::Delete { name } => {
            if name.trim().is_empty() {
                return Response::error("task name is required");
            }
            match manager.delete_task(&name).await {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            }
        }
    }
}

fn new_task(payload: AddPayload) -> std::result::Result<NewTask, String> {
    let required = [
        ("name", &payload.name),
        ("source_path", &payload.source_path),
        ("target_path", &payload.target_path),
        ("schedule", &payload.schedule),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(format!("{} is required", field));
    }

    let schedule: Schedule = payload.schedule.parse().map_err(|e| format!("{}", e))?;
    Ok(NewTask {
        name: payload.name,
        source_path: PathBuf::from(payload.source_path),
        target_path: PathBuf::from(payload.target_path),
        schedule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::IpcClient;
    use crate::sync::SyncEngine;
    use crate::task::{TaskStatus, TaskStore};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct Harness {
        dir: TempDir,
        socket: PathBuf,
        manager: TaskManager,
        shutdown: CancellationToken,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start() -> anyhow::Result<Harness> {
        let dir = TempDir::new()?;
        let store = TaskStore::open(dir.path().join("tasks.json")).await?;
        let manager = TaskManager::open(store, SyncEngine::default()).await?;
        let socket = dir.path().join("watchman.sock");

        let server = IpcServer::bind(&socket, manager.clone())?;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        Ok(Harness {
            dir,
            socket,
            manager,
            shutdown,
            handle,
        })
    }

    impl Harness {
        fn add_payload(&self, name: &str) -> AddPayload {
            let source = self.dir.path().join("src");
            std::fs::create_dir_all(&source).unwrap();
            AddPayload {
                name: name.to_string(),
                source_path: source.display().to_string(),
                target_path: self.dir.path().join("dst").display().to_string(),
                schedule: "60".to_string(),
            }
        }

        async fn stop(self) -> anyhow::Result<()> {
            self.shutdown.cancel();
            self.handle.await??;
            self.manager.shutdown().await;
            assert!(!self.socket.exists());
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_task_lifecycle_over_socket() -> anyhow::Result<()> {
        let harness = start().await?;
        let mut client = IpcClient::connect(&harness.socket).await?;

        client.add(harness.add_payload("docs")).await?;
        let tasks = client.list().await?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "docs");

        let err = client.add(harness.add_payload("docs")).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        client.stop("docs").await?;
        assert_eq!(client.list().await?[0].status, TaskStatus::Stopped);

        client.delete("docs").await?;
        assert!(client.list().await?.is_empty());

        let err = client.stop("docs").await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        drop(client);
        harness.stop().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_malformed_and_incomplete_requests() -> anyhow::Result<()> {
        let harness = start().await?;
        let stream = UnixStream::connect(&harness.socket).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"this is not json\n").await?;
        let reply: Response = serde_json::from_str(&lines.next_line().await?.unwrap())?;
        assert!(!reply.success);
        assert!(reply.error.unwrap().starts_with("invalid request"));

        let mut payload = harness.add_payload("");
        payload.name = "  ".to_string();
        let request = serde_json::to_string(&Request::Add(payload))?;
        write_half.write_all(format!("{}\n", request).as_bytes()).await?;
        let reply: Response = serde_json::from_str(&lines.next_line().await?.unwrap())?;
        assert_eq!(reply.error.as_deref(), Some("name is required"));

        let mut payload = harness.add_payload("weird");
        payload.schedule = "every tuesday".to_string();
        let request = serde_json::to_string(&Request::Add(payload))?;
        write_half.write_all(format!("{}\n", request).as_bytes()).await?;
        let reply: Response = serde_json::from_str(&lines.next_line().await?.unwrap())?;
        assert!(reply.error.unwrap().contains("invalid schedule"));

        assert!(harness.manager.list_tasks().await.is_empty());

        drop(write_half);
        drop(lines);
        harness.stop().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_socket_is_world_writable() -> anyhow::Result<()> {
        let harness = start().await?;
        let mode = std::fs::metadata(&harness.socket)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
        harness.stop().await
    }

    #[tokio::test]
    async fn test_bind_refuses_regular_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, b"data")?;

        assert!(matches!(
            remove_stale_socket(&path),
            Err(DaemonError::Config(_))
        ));
        assert!(path.exists());
        Ok(())
    }
}
