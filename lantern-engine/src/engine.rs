//! The render pipeline and the enumeration probes built on top of it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use lantern_core::{
    ExecutionResult, ProfileKey, RenderRequest, RenderResult, Settings, LOCALHOST,
};
use lantern_script::{
    invocation_args, parse_variables,
    playbook::to_yaml,
    probe::{host_list_request, host_vars_request},
    Play, ScriptBuilder,
};

use crate::error::EngineError;
use crate::executor::{merge_env, ProcessExecutor, PLAYBOOK_ENV};
use crate::extract::interpret;
use crate::plugins::{self, PluginListing};
use crate::roles::{finalize_roles, strategy_for, RoleListing};
use crate::sanitize::Sanitizer;
use crate::scratch::ScratchFile;

pub const PROFILE_NOT_FOUND: &str = "Profile cannot be found.";

/// Inventory hosts for a profile. Always starts with the control host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostListing {
    pub successful: bool,
    pub hosts: Vec<String>,
}

/// Variable names visible to one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarListing {
    pub successful: bool,
    pub vars: Vec<String>,
}

/// Everything needed to run the engine for one settings snapshot.
///
/// Cheap to share behind an `Arc`; a settings reload builds a new `Engine`.
#[derive(Debug)]
pub struct Engine {
    settings: Arc<Settings>,
    executor: ProcessExecutor,
    sanitizer: Sanitizer,
    scripts: ScriptBuilder,
}

impl Engine {
    /// `workspace` becomes the working directory of every engine process.
    pub fn new(settings: Arc<Settings>, workspace: Option<PathBuf>) -> Self {
        Self {
            executor: ProcessExecutor::new(workspace, settings.timeout_ms),
            sanitizer: Sanitizer::lenient(&settings.output_regex_sanitize_rules),
            scripts: ScriptBuilder::new(settings.collection_references.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scripts(&self) -> &ScriptBuilder {
        &self.scripts
    }

    /// Render the user's template.
    pub async fn render(&self, request: &RenderRequest) -> RenderResult {
        self.render_with(request, None).await
    }

    /// Render with an optional replacement playbook. The replacement must
    /// still contain the probe play and task.
    pub async fn render_with(
        &self,
        request: &RenderRequest,
        playbook: Option<Vec<Play>>,
    ) -> RenderResult {
        let Some(profile) = self.settings.resolve(&request.profile) else {
            return RenderResult::failure(PROFILE_NOT_FOUND);
        };
        let has_variables = match parse_variables(&request.variables) {
            Ok(variables) => variables.is_some(),
            Err(err) => return RenderResult::failure(err.to_string()),
        };

        let plays = playbook.unwrap_or_else(|| self.scripts.render_playbook(request));
        let yaml = match to_yaml(&plays) {
            Ok(yaml) => yaml,
            Err(err) => return RenderResult::failure(err.to_string()),
        };

        let (playbook_file, variables_file) = match scratch_files(&yaml, &request.variables) {
            Ok(files) => files,
            Err(err) => return RenderResult::failure(format!("Unable to prepare scratch files: {err}")),
        };

        let args = invocation_args(
            &profile.args,
            playbook_file.path(),
            has_variables.then(|| variables_file.path()),
        );
        let env = merge_env(&profile.env, PLAYBOOK_ENV);
        let mut result = self.executor.run(&profile.cmd_playbook, &args, &env).await;
        drop(playbook_file);
        drop(variables_file);

        result.stdout = self.sanitizer.apply(&result.stdout);
        let verdict = interpret(&result.stdout, &request.host, self.settings.tab_size);

        RenderResult {
            successful: verdict.successful,
            kind: verdict.kind,
            result: verdict.result,
            debug: debug_dump(&result),
        }
    }

    /// Enumerate inventory hosts. On failure the list holds only the control host.
    pub async fn list_hosts(&self, profile: &ProfileKey) -> HostListing {
        let rendered = self.render(&host_list_request(profile.clone())).await;
        let (successful, mut hosts) = decode_names(&rendered.result);
        if !hosts.iter().any(|host| host == LOCALHOST) {
            hosts.insert(0, LOCALHOST.to_string());
        }
        HostListing { successful, hosts }
    }

    /// Enumerate the variable names visible to `host` with `role` attached.
    pub async fn list_host_vars(&self, profile: &ProfileKey, host: &str, role: &str) -> VarListing {
        let rendered = self.render(&host_vars_request(profile.clone(), host, role)).await;
        let (successful, vars) = decode_names(&rendered.result);
        VarListing { successful, vars }
    }

    /// Enumerate roles with the configured strategy; the list always starts
    /// with the empty "no role" entry.
    pub async fn list_roles(&self, profile: &ProfileKey) -> RoleListing {
        let strategy = strategy_for(self.settings.role_detection_mode);
        let listing = strategy.discover(self, profile).await;
        RoleListing {
            successful: listing.successful,
            roles: finalize_roles(listing.roles),
        }
    }

    /// Enumerate filter and role plugins of the imported collections.
    pub async fn list_plugins(&self, profile: &ProfileKey) -> PluginListing {
        plugins::list_plugins(self, profile).await
    }

    /// Run an auxiliary tool (role listing, documentation) with the profile
    /// environment but without the playbook overrides.
    pub(crate) async fn run_tool(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> ExecutionResult {
        self.executor.run(command, args, env).await
    }
}

fn scratch_files(playbook: &str, variables: &str) -> Result<(ScratchFile, ScratchFile), EngineError> {
    Ok((
        ScratchFile::create(playbook, ".yml")?,
        ScratchFile::create(variables, ".yml")?,
    ))
}

/// Decode a rendered result as a JSON list of strings.
fn decode_names(result: &str) -> (bool, Vec<String>) {
    match serde_json::from_str::<Vec<String>>(result) {
        Ok(names) => (true, names),
        Err(_) => (false, vec![]),
    }
}

fn debug_dump(result: &ExecutionResult) -> String {
    serde_yaml::to_string(result).unwrap_or_else(|err| format!("unable to format debug output: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(settings: Settings) -> Engine {
        Engine::new(Arc::new(settings), None)
    }

    #[tokio::test]
    async fn unknown_profile_fails_without_running_anything() {
        let request = RenderRequest::local(ProfileKey::from("missing"), "{{ foo }}");
        let result = engine(Settings::default()).render(&request).await;
        assert_eq!(result, RenderResult::failure(PROFILE_NOT_FOUND));
    }

    #[tokio::test]
    async fn malformed_variables_fail_before_running_anything() {
        let mut request = RenderRequest::local(ProfileKey::from("default"), "{{ foo }}");
        request.variables = "foo: [unterminated".to_string();
        let result = engine(Settings::default()).render(&request).await;
        assert!(!result.successful);
        assert!(result.result.contains("malformed"));
        assert!(result.debug.is_empty());
    }

    #[test]
    fn decode_names_requires_string_list() {
        assert_eq!(decode_names("[\"a\", \"b\"]"), (true, vec!["a".to_string(), "b".to_string()]));
        assert_eq!(decode_names("Profile cannot be found."), (false, vec![]));
        assert_eq!(decode_names("[1, 2]"), (false, vec![]));
    }
}
