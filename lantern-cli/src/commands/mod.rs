pub mod daemon;
pub mod init;
pub mod probe;
pub mod profiles;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use lantern_core::settings::{load_at, settings_path_at};
use lantern_core::LoadedSettings;
use lantern_engine::Engine;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load settings, warning about any profile that had to be dropped.
pub(crate) fn load_settings(home: &std::path::Path) -> Result<LoadedSettings> {
    let loaded = load_at(home).with_context(|| {
        format!(
            "failed to load settings from {}",
            settings_path_at(home).display()
        )
    })?;
    if !loaded.is_clean() {
        eprintln!(
            "{} malformed profiles ignored ({}); please fix {}",
            "warning:".yellow().bold(),
            loaded.malformed.join(", "),
            settings_path_at(home).display(),
        );
    }
    Ok(loaded)
}

/// Engine for one-shot commands, working in the current directory.
pub(crate) fn engine() -> Result<Engine> {
    let home = home()?;
    let settings = load_settings(&home)?.settings;
    let workspace = std::env::current_dir().context("could not determine current directory")?;
    Ok(Engine::new(Arc::new(settings), Some(workspace)))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    init_tracing();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
