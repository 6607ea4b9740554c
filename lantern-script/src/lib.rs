//! # lantern-script
//!
//! Builds the playbook that the engine runs for a render, and the argument
//! list that runs it.
//!
//! Every script follows the same tagging convention: the injected tasks carry
//! [`TAG_WHITELIST`], an attached role carries [`TAG_BLACKLIST`], and the
//! invocation asks for `--tags whitelist --skip-tags always,blacklist`. Only
//! the probe task (and optionally fact gathering) ever executes, so attaching
//! a role never runs its side effects.
//!
//! ```rust
//! use lantern_core::{ProfileKey, RenderRequest};
//! use lantern_script::ScriptBuilder;
//!
//! let request = RenderRequest::local(ProfileKey::from("default"), "{{ inventory_hostname }}");
//! let yaml = ScriptBuilder::default().render_yaml(&request).expect("yaml");
//! assert!(yaml.contains("tag_whitelist_tasks"));
//! ```

pub mod error;
pub mod playbook;
pub mod probe;
pub mod variables;

pub use error::ScriptError;
pub use playbook::{invocation_args, Play, RoleRef, ScriptBuilder, Task};
pub use variables::parse_variables;

/// Name of the probe play and of the probe task inside it.
pub const PLAYBOOK_TITLE: &str = "Print Template";
/// Tag marking tasks that must run.
pub const TAG_WHITELIST: &str = "tag_whitelist_tasks";
/// Tag marking role-internal tasks that must be suppressed.
pub const TAG_BLACKLIST: &str = "tag_blacklist_tasks";
