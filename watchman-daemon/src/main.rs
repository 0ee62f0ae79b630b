//! watchmand - backup daemon entry point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use watchman_daemon::{
    config::Config,
    daemon::{PidFile, ShutdownCoordinator},
    fs::TreeScanner,
    ipc::IpcServer,
    utils, SyncEngine, TaskManager, TaskStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Control socket path (overrides config)
    #[arg(short, long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(socket) = args.socket {
        config.daemon.socket_path = socket;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting watchmand v{}", env!("CARGO_PKG_VERSION"));

    let _pid_file = PidFile::acquire(&config.daemon.pid_file)?;

    let store = TaskStore::open(&config.daemon.tasks_file).await?;
    tracing::info!("Task file: {}", store.path().display());

    let engine = SyncEngine::new(TreeScanner::new(config.sync.scan_options()));
    let manager = TaskManager::open(store, engine).await?;

    let server = IpcServer::bind(&config.daemon.socket_path, manager.clone())?;
    let shutdown_coordinator = ShutdownCoordinator::new();
    let server_handle = tokio::spawn(server.run(shutdown_coordinator.token()));

    // Socket stops accepting on signal; schedules are disarmed after it closes
    shutdown_coordinator.wait_for_signal().await;
    match tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Control socket closed"),
        Ok(Ok(Err(e))) => tracing::error!("Control socket error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Control socket task panicked: {}", e),
        Err(_) => tracing::warn!("Control socket shutdown timeout, forcing exit"),
    }

    manager.shutdown().await;
    tracing::info!("watchmand stopped");

    Ok(())
}
