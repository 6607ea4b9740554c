//! # lantern-engine
//!
//! Runs the external templating engine and turns its output into a single
//! [`RenderResult`](lantern_core::RenderResult).
//!
//! Pipeline for one render:
//!
//! 1. resolve the profile and decode the variables ([`Engine::render`])
//! 2. write the playbook and variables to [`scratch`] files
//! 3. run the playbook tool ([`executor`])
//! 4. strip noise and parse JSON ([`sanitize`])
//! 5. pick the probe result for the target host and classify it ([`extract`])
//!
//! Host, variable, role and plugin enumeration reuse the same pipeline.

pub mod engine;
pub mod error;
pub mod executor;
pub mod extract;
pub mod plugins;
pub mod roles;
pub mod sanitize;
pub mod scratch;

pub use engine::{Engine, HostListing, VarListing};
pub use error::EngineError;
pub use executor::ProcessExecutor;
pub use plugins::PluginListing;
pub use roles::{finalize_roles, DirectoryRoles, GalaxyRoles, RoleDiscovery, RoleListing};
pub use sanitize::Sanitizer;
