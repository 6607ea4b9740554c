//! Error types for lantern-script.

use thiserror::Error;

/// All errors that can arise while preparing a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The playbook could not be serialized.
    #[error("playbook serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The variables string is non-blank but not a JSON or YAML mapping.
    #[error("Variables are malformed, must be JSON- or yaml-decodable object: {reason}")]
    VariablesMalformed { reason: String },
}
