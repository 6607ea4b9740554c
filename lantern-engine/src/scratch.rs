//! Ephemeral files handed to the engine by path.
//!
//! A [`ScratchFile`] is created right before a run and removed when dropped,
//! so every exit path of the render (including early returns) cleans up.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{io_err, EngineError};

#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Create a private temp file holding `contents`.
    pub fn create(contents: &str, suffix: &str) -> Result<Self, EngineError> {
        let mut file = tempfile::Builder::new()
            .prefix("lantern-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        let path = file.path().to_path_buf();
        file.write_all(contents.as_bytes()).map_err(|e| io_err(&path, e))?;
        file.flush().map_err(|e| io_err(&path, e))?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
