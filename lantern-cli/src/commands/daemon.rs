//! `lantern daemon`: background server lifecycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use lantern_daemon::paths::socket_path;
use lantern_daemon::{request_status, request_stop, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (socket server + settings watcher).
    Start {
        /// Working directory for engine processes; defaults to the current one.
        #[arg(long, value_name = "DIR")]
        workspace: Option<PathBuf>,
    },
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        DaemonCommand::Start { workspace } => {
            let workspace = workspace
                .map(|dir| {
                    dir.canonicalize()
                        .with_context(|| format!("cannot resolve workspace '{}'", dir.display()))
                })
                .transpose()?;
            start_blocking(&home, workspace).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let payload = match request_status(&home) {
                Ok(status) => serde_json::to_value(status).context("failed to encode daemon status")?,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render daemon status JSON")?
            );
        }
    }

    Ok(())
}
