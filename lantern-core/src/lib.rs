//! Lantern core library: domain types, settings persistence and errors.
//!
//! - [`types`]: profiles, render requests/results, execution results
//! - [`settings`]: load / save / init of `~/.lantern/settings.yaml`
//! - [`error`]: [`SettingsError`]

pub mod error;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use settings::{LoadedSettings, RoleDetectionMode, Settings};
pub use types::{
    ExecutionResult, FilterPlugin, Profile, ProfileKey, RenderRequest, RenderResult, ResultKind,
    LOCALHOST,
};
