//! Role discovery strategies.
//!
//! Both strategies share one return contract, [`RoleListing`], and feed into
//! [`finalize_roles`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use lantern_core::{ProfileKey, ResultKind, RoleDetectionMode};
use lantern_script::probe::role_scan_request;

use crate::engine::Engine;

/// Roles found for a profile, plus whether discovery succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleListing {
    pub successful: bool,
    pub roles: Vec<String>,
}

#[async_trait]
pub trait RoleDiscovery: Send + Sync {
    async fn discover(&self, engine: &Engine, profile: &ProfileKey) -> RoleListing;
}

/// Strategy selected by the settings.
pub fn strategy_for(mode: RoleDetectionMode) -> Box<dyn RoleDiscovery> {
    match mode {
        RoleDetectionMode::Galaxy => Box::new(GalaxyRoles),
        RoleDetectionMode::DirectoryLookup => Box::new(DirectoryRoles),
    }
}

/// Sort case-insensitively and prepend the "no role selected" entry.
pub fn finalize_roles(mut roles: Vec<String>) -> Vec<String> {
    roles.sort_by_cached_key(|role| role.to_lowercase());
    roles.insert(0, String::new());
    roles
}

// ---------------------------------------------------------------------------
// Galaxy listing
// ---------------------------------------------------------------------------

/// Runs `<cmdGalaxy> role list` and parses its line-oriented output.
#[derive(Debug, Clone, Copy, Default)]
pub struct GalaxyRoles;

#[async_trait]
impl RoleDiscovery for GalaxyRoles {
    async fn discover(&self, engine: &Engine, profile: &ProfileKey) -> RoleListing {
        let Some(profile) = engine.settings().resolve(profile) else {
            return RoleListing::default();
        };
        let args = ["role".to_string(), "list".to_string()];
        let result = engine.run_tool(&profile.cmd_galaxy, &args, &profile.env).await;
        if !result.successful {
            return RoleListing::default();
        }
        RoleListing {
            successful: true,
            roles: parse_galaxy_listing(&result.stdout),
        }
    }
}

static GALAXY_ROLE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^- (?P<name>[\w.-]+), .+$").expect("galaxy role pattern compiles"));

/// Extract role names from lines shaped like `- name, version`.
pub fn parse_galaxy_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|l| GALAXY_ROLE_LINE.captures(l.trim_end()))
        .filter_map(|caps| caps.name("name").map(|m| m.as_str().to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

/// Renders a probe playbook that lists the directories in the configured
/// role paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryRoles;

#[async_trait]
impl RoleDiscovery for DirectoryRoles {
    async fn discover(&self, engine: &Engine, profile: &ProfileKey) -> RoleListing {
        let request = role_scan_request(profile.clone());
        let playbook = engine.scripts().role_scan_playbook(&request.host);
        let rendered = engine.render_with(&request, Some(playbook)).await;

        if rendered.kind != ResultKind::Structure {
            return RoleListing {
                successful: false,
                roles: vec![],
            };
        }
        match serde_json::from_str::<Vec<String>>(&rendered.result) {
            Ok(roles) => RoleListing {
                successful: rendered.successful,
                roles,
            },
            Err(_) => RoleListing::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_sorts_case_insensitively_and_prepends_empty() {
        let roles = vec!["nginx".to_string(), "Apache".to_string(), "docker".to_string()];
        assert_eq!(finalize_roles(roles), vec!["", "Apache", "docker", "nginx"]);
    }

    #[test]
    fn finalize_of_nothing_is_just_the_empty_entry() {
        assert_eq!(finalize_roles(vec![]), vec![""]);
    }

    #[test]
    fn galaxy_listing_extracts_role_names() {
        let stdout = "# /home/me/.ansible/roles\n- geerlingguy.docker, 7.4.1\n- nginx, (unknown version)\n# /etc/ansible/roles\n[WARNING]: - the configured path /usr/share/ansible/roles does not exist.\n";
        assert_eq!(
            parse_galaxy_listing(stdout),
            vec!["geerlingguy.docker", "nginx"]
        );
    }

    #[test]
    fn galaxy_listing_without_roles_is_empty() {
        assert!(parse_galaxy_listing("# /etc/ansible/roles\n").is_empty());
        assert!(parse_galaxy_listing("").is_empty());
    }
}
