//! watchman - command-line client for the watchman backup daemon

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use watchman_daemon::ipc::{AddPayload, IpcClient, DEFAULT_SOCKET_PATH};
use watchman_daemon::{utils, BackupTask, Schedule};

/// Paths longer than this are shortened in `list` output
const PATH_COLUMN_LIMIT: usize = 27;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backup interval in minutes (for `add`)
    #[arg(short = 'n', long = "interval", value_name = "MINUTES")]
    interval: Option<u64>,

    /// Control socket of the daemon
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a backup task and run it once immediately
    Add {
        name: String,
        source: PathBuf,
        target: PathBuf,
        /// Six-field cron expression (sec min hour day month weekday), unless -n is given
        schedule: Option<String>,
    },
    /// List all backup tasks
    List,
    /// Stop a task's schedule
    Stop { name: String },
    /// Delete a task (the backup copy is kept)
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    utils::logger::init(&args.log_level)?;

    let mut client = IpcClient::connect(&args.socket).await?;
    tracing::debug!("Connected to {}", args.socket.display());

    match args.command {
        Command::Add {
            name,
            source,
            target,
            schedule,
        } => {
            let schedule = resolve_schedule(args.interval, schedule.as_deref())?;
            let payload = AddPayload {
                name: name.clone(),
                source_path: absolute(&source)?.display().to_string(),
                target_path: absolute(&target)?.display().to_string(),
                schedule: schedule.to_string(),
            };
            client.add(payload).await?;
            println!("Task {} added ({})", name, describe_schedule(&schedule));
        }
        Command::List => {
            let tasks = client.list().await?;
            print!("{}", render_tasks(&tasks));
        }
        Command::Stop { name } => {
            client.stop(&name).await?;
            println!("Task {} stopped", name);
        }
        Command::Delete { name } => {
            client.delete(&name).await?;
            println!("Task {} deleted", name);
        }
    }

    Ok(())
}

/// `-n` selects a minute interval; otherwise a cron expression is required.
fn resolve_schedule(interval: Option<u64>, expression: Option<&str>) -> Result<Schedule> {
    let schedule = match (interval, expression) {
        (Some(_), Some(_)) => bail!("give either -n <minutes> or a cron expression, not both"),
        (Some(minutes), None) => Schedule::every_minutes(minutes)?,
        (None, Some(expression)) => Schedule::cron(expression)?,
        (None, None) => bail!("a schedule is required: use -n <minutes> or a cron expression"),
    };
    Ok(schedule)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))
}

fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Interval { minutes } => format!("every {}m", minutes),
        Schedule::Cron(expression) => format!("cron \"{}\"", expression),
    }
}

fn schedule_column(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Interval { minutes } => format!("{}m", minutes),
        Schedule::Cron(expression) => expression.clone(),
    }
}

fn truncate_path(path: &Path) -> String {
    let text = path.display().to_string();
    if text.chars().count() > PATH_COLUMN_LIMIT {
        let head: String = text.chars().take(PATH_COLUMN_LIMIT - 3).collect();
        format!("{}...", head)
    } else {
        text
    }
}

fn render_tasks(tasks: &[BackupTask]) -> String {
    if tasks.is_empty() {
        return "No backup tasks found\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20}\t{:<30}\t{:<30}\t{:<15}\t{:<10}\t{:<10}\t{:<25}",
        "NAME", "SOURCE", "TARGET", "SCHEDULE", "STATUS", "PROGRESS", "LAST BACKUP"
    );

    for task in tasks {
        let last_backup = task
            .last_backup
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        let _ = writeln!(
            out,
            "{:<20}\t{:<30}\t{:<30}\t{:<15}\t{:<10}\t{:<10}\t{:<25}",
            task.name,
            truncate_path(&task.source_path),
            truncate_path(&task.target_path),
            schedule_column(&task.schedule),
            task.status,
            format!("{:.1}%", task.progress),
            last_backup
        );

        if let Some(error) = task.error.as_deref().filter(|e| !e.is_empty()) {
            let _ = writeln!(out, "  Error: {}", error);
        }
    }

    out
}
