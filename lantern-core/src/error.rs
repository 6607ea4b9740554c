//! Error types for lantern-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so there is no `~/.lantern/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// `init` refused to overwrite an existing settings file.
    #[error("settings already exist at {path}")]
    AlreadyExists { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.into(),
        source,
    }
}
