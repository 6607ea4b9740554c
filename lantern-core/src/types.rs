//! Domain types shared by every Lantern crate.
//!
//! Field names serialize in camelCase because the same structs travel over the
//! daemon socket to the UI client.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Inventory name of the control host; always a valid render target.
pub const LOCALHOST: &str = "localhost";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for an execution profile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileKey(pub String);

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProfileKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProfileKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Named execution configuration for invoking the templating engine.
///
/// Immutable once resolved; a settings reload produces a new snapshot rather
/// than mutating profiles in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Arguments prepended to every playbook invocation (inventory, vault, ...).
    pub args: Vec<String>,
    /// Documentation tool, used to list filter and role plugins.
    pub cmd_doc: String,
    /// Role-listing tool.
    pub cmd_galaxy: String,
    /// Playbook runner that performs the render itself.
    pub cmd_playbook: String,
    /// Extra environment layered over the daemon's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Profile {
    /// The stock profile: plain `ansible-*` binaries from `PATH`.
    pub fn stock() -> Self {
        Self {
            args: vec![],
            cmd_doc: "ansible-doc".to_string(),
            cmd_galaxy: "ansible-galaxy".to_string(),
            cmd_playbook: "ansible-playbook".to_string(),
            env: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Render request / result
// ---------------------------------------------------------------------------

/// One render action issued by the UI. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub profile: ProfileKey,
    pub host: String,
    /// Empty string means "no role".
    pub role: String,
    pub gather_facts: bool,
    /// Raw JSON or YAML mapping; blank means no extra variables at all.
    pub variables: String,
    pub template: String,
}

impl RenderRequest {
    /// A request against the control host with no role, facts or variables.
    pub fn local(profile: ProfileKey, template: impl Into<String>) -> Self {
        Self {
            profile,
            host: LOCALHOST.to_string(),
            role: String::new(),
            gather_facts: false,
            variables: String::new(),
            template: template.into(),
        }
    }
}

/// How the rendered value was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    String,
    Structure,
    #[default]
    Unknown,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::String => write!(f, "string"),
            ResultKind::Structure => write!(f, "structure"),
            ResultKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of one render, delivered to the UI as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub successful: bool,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub result: String,
    pub debug: String,
}

impl RenderResult {
    /// A terminal failure that never reached (or never got past) the engine.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            kind: ResultKind::Unknown,
            result: message.into(),
            debug: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Process output
// ---------------------------------------------------------------------------

/// Captured output of one external process run. Never an error: a nonzero
/// exit, a timeout and a spawn failure all land here with `successful = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub successful: bool,
    pub stdout: String,
    pub stderr: String,
}

/// A filter plugin offered for autocompletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPlugin {
    pub name: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
