//! Playbook model and [`ScriptBuilder`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use lantern_core::RenderRequest;

use crate::error::ScriptError;
use crate::{PLAYBOOK_TITLE, TAG_BLACKLIST, TAG_WHITELIST};

/// Jinja expression that lists the directories found by the role scan task.
const ROLE_SCAN_MSG: &str =
    "{{ _res.results | map(attribute='files') | flatten | map(attribute='path') | map('basename') | unique | sort }}";

// ---------------------------------------------------------------------------
// Playbook model
// ---------------------------------------------------------------------------

/// A single play. Serialized in the engine's native YAML shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    pub gather_facts: bool,
    pub collections: Vec<String>,
    pub roles: Vec<RoleRef>,
    pub tasks: Vec<Task>,
}

/// A role attached to a play, tagged so none of its tasks run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRef {
    pub role: String,
    pub tags: Vec<String>,
}

/// A task: one module invocation plus its keywords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exactly one entry: module name → module arguments.
    #[serde(flatten)]
    pub action: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_over: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register: Option<String>,
    pub tags: Vec<String>,
}

impl Task {
    fn new(module: &str, args: Value) -> Self {
        let mut action = BTreeMap::new();
        action.insert(module.to_string(), args);
        Self {
            name: None,
            action,
            when: None,
            loop_over: None,
            register: None,
            tags: vec![TAG_WHITELIST.to_string()],
        }
    }

    fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The probe task: prints `msg` under the fixed probe title.
    pub fn probe(msg: &str) -> Self {
        Self::new("ansible.builtin.debug", json!({ "msg": msg })).named(PLAYBOOK_TITLE)
    }

    /// Fact gathering, executed only when `enabled`.
    pub fn gather_facts(enabled: bool) -> Self {
        let mut task = Self::new("ansible.builtin.setup", json!({}));
        task.when = Some(Value::Bool(enabled));
        task
    }
}

// ---------------------------------------------------------------------------
// ScriptBuilder
// ---------------------------------------------------------------------------

/// Assembles playbooks for renders and probes.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    collections: Vec<String>,
}

impl ScriptBuilder {
    /// `collections` is inserted into every render play's `collections` key.
    pub fn new(collections: Vec<String>) -> Self {
        Self { collections }
    }

    /// The playbook for a user render (also used by the host and host-var probes).
    pub fn render_playbook(&self, request: &RenderRequest) -> Vec<Play> {
        let roles = if request.role.is_empty() {
            vec![]
        } else {
            vec![RoleRef {
                role: request.role.clone(),
                tags: vec![TAG_BLACKLIST.to_string()],
            }]
        };

        vec![Play {
            name: PLAYBOOK_TITLE.to_string(),
            hosts: request.host.clone(),
            gather_facts: request.gather_facts,
            collections: self.collections.clone(),
            roles,
            tasks: vec![
                Task::gather_facts(request.gather_facts),
                Task::probe(&request.template),
            ],
        }]
    }

    /// The playbook that lists the base names of every directory under the
    /// engine's configured role paths, deduplicated and sorted.
    pub fn role_scan_playbook(&self, host: &str) -> Vec<Play> {
        let mut find = Task::new(
            "ansible.builtin.find",
            json!({
                "paths": "{{ item }}",
                "recurse": false,
                "file_type": "directory",
            }),
        );
        find.loop_over = Some("{{ lookup('ansible.builtin.config', 'DEFAULT_ROLES_PATH') }}".to_string());
        find.register = Some("_res".to_string());

        vec![Play {
            name: PLAYBOOK_TITLE.to_string(),
            hosts: host.to_string(),
            gather_facts: false,
            collections: vec![],
            roles: vec![],
            tasks: vec![find, Task::probe(ROLE_SCAN_MSG)],
        }]
    }

    /// Serialize the render playbook for `request`.
    pub fn render_yaml(&self, request: &RenderRequest) -> Result<String, ScriptError> {
        to_yaml(&self.render_playbook(request))
    }
}

/// Serialize a playbook to YAML.
pub fn to_yaml(plays: &[Play]) -> Result<String, ScriptError> {
    Ok(serde_yaml::to_string(plays)?)
}

/// Arguments for one playbook run: the profile's own arguments, the playbook
/// path, the tag selection and, only when variables were supplied, the
/// extra-vars file reference.
pub fn invocation_args(
    profile_args: &[String],
    playbook: &Path,
    extra_vars: Option<&Path>,
) -> Vec<String> {
    let mut args = profile_args.to_vec();
    args.push(playbook.display().to_string());
    args.push("--tags".to_string());
    args.push(TAG_WHITELIST.to_string());
    args.push("--skip-tags".to_string());
    args.push(format!("always,{TAG_BLACKLIST}"));
    if let Some(path) = extra_vars {
        args.push("--extra-vars".to_string());
        args.push(format!("@{}", path.display()));
    }
    args
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
