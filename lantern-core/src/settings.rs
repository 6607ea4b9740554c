//! User settings: execution profiles plus render preferences.
//!
//! # Storage layout
//!
//! ```text
//! ~/.lantern/
//!   settings.yaml   (mode 0600, written by `lantern init`)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home, used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! # Validation
//!
//! Profiles are validated one by one. A malformed entry is dropped and its key
//! reported in [`LoadedSettings::malformed`]; when that leaves no profile at
//! all, the stock profile set is used instead.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SettingsError};
use crate::types::{Profile, ProfileKey};

const DEFAULT_TAB_SIZE: usize = 2;
const DEFAULT_PROFILE: &str = "default";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which algorithm enumerates the roles available to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoleDetectionMode {
    /// Parse the output of `<cmdGalaxy> role list`.
    #[serde(rename = "Ansible Galaxy")]
    Galaxy,
    /// Scan the configured role paths through a probe playbook.
    #[default]
    #[serde(rename = "Directory lookup")]
    DirectoryLookup,
}

impl fmt::Display for RoleDetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleDetectionMode::Galaxy => write!(f, "Ansible Galaxy"),
            RoleDetectionMode::DirectoryLookup => write!(f, "Directory lookup"),
        }
    }
}

/// Validated settings snapshot. Immutable; reloads produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub profiles: BTreeMap<ProfileKey, Profile>,
    pub tab_size: usize,
    /// Process timeout in milliseconds; `0` disables the timeout.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    pub output_regex_sanitize_rules: Vec<String>,
    pub role_detection_mode: RoleDetectionMode,
    pub collection_imports: Vec<String>,
    pub collection_references: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            tab_size: DEFAULT_TAB_SIZE,
            timeout_ms: 0,
            output_regex_sanitize_rules: vec![],
            role_detection_mode: RoleDetectionMode::default(),
            collection_imports: vec![],
            collection_references: vec![],
        }
    }
}

impl Settings {
    /// Look up a profile by key.
    pub fn resolve(&self, key: &ProfileKey) -> Option<&Profile> {
        self.profiles.get(key)
    }

    /// Parse and validate a settings document.
    pub fn from_yaml(contents: &str) -> Result<LoadedSettings, serde_yaml::Error> {
        let raw: RawSettings = if contents.trim().is_empty() {
            RawSettings::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        Ok(raw.validate())
    }
}

/// Result of loading settings: the usable snapshot plus the keys of any
/// profiles that had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub malformed: Vec<String>,
}

impl LoadedSettings {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSettings {
    profiles: Option<BTreeMap<String, serde_yaml::Value>>,
    tab_size: i64,
    timeout: u64,
    output_regex_sanitize_rules: Vec<String>,
    role_detection_mode: RoleDetectionMode,
    collection_imports: Vec<String>,
    collection_references: Vec<String>,
}

impl RawSettings {
    fn validate(self) -> LoadedSettings {
        let mut malformed = Vec::new();
        let mut profiles = BTreeMap::new();

        match self.profiles {
            None => profiles = default_profiles(),
            Some(entries) => {
                for (key, value) in entries {
                    match serde_yaml::from_value::<Profile>(value) {
                        Ok(profile) => {
                            profiles.insert(ProfileKey(key), profile);
                        }
                        Err(err) => {
                            tracing::warn!(profile = %key, error = %err, "dropping malformed profile");
                            malformed.push(key);
                        }
                    }
                }
                if !malformed.is_empty() && profiles.is_empty() {
                    profiles = default_profiles();
                }
            }
        }

        let tab_size = usize::try_from(self.tab_size)
            .ok()
            .filter(|size| *size >= 1)
            .unwrap_or(DEFAULT_TAB_SIZE);

        LoadedSettings {
            settings: Settings {
                profiles,
                tab_size,
                timeout_ms: self.timeout,
                output_regex_sanitize_rules: self.output_regex_sanitize_rules,
                role_detection_mode: self.role_detection_mode,
                collection_imports: self.collection_imports,
                collection_references: self.collection_references,
            },
            malformed,
        }
    }
}

fn default_profiles() -> BTreeMap<ProfileKey, Profile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(ProfileKey::from(DEFAULT_PROFILE), Profile::stock());
    profiles
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.lantern/`
pub fn lantern_root(home: &Path) -> PathBuf {
    home.join(".lantern")
}

/// `<home>/.lantern/settings.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    lantern_root(home).join("settings.yaml")
}

// ---------------------------------------------------------------------------
// Load / save / init
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.lantern/settings.yaml`.
///
/// A missing file yields the defaults. A file that is not valid YAML, or whose
/// top-level shape is wrong, is a [`SettingsError::Parse`].
pub fn load_at(home: &Path) -> Result<LoadedSettings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(LoadedSettings {
            settings: Settings::default(),
            malformed: vec![],
        });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Settings::from_yaml(&contents).map_err(|source| SettingsError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<LoadedSettings, SettingsError> {
    load_at(&home()?)
}

/// Atomically write settings: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<PathBuf, SettingsError> {
    let root = lantern_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Write the default settings file. Refuses to overwrite unless `force`.
pub fn init_at(home: &Path, force: bool) -> Result<PathBuf, SettingsError> {
    let path = settings_path_at(home);
    if path.exists() && !force {
        return Err(SettingsError::AlreadyExists { path });
    }
    save_at(home, &Settings::default())
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<PathBuf, SettingsError> {
    init_at(&home()?, force)
}

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PROFILE: &str = "cmdDoc: ansible-doc\n    cmdGalaxy: ansible-galaxy\n    cmdPlaybook: ansible-playbook\n    args: []\n    env: {}";

    #[test]
    fn empty_document_yields_defaults() {
        let loaded = Settings::from_yaml("").expect("parse");
        assert!(loaded.is_clean());
        assert_eq!(loaded.settings, Settings::default());
        assert!(loaded.settings.resolve(&ProfileKey::from("default")).is_some());
    }

    #[test]
    fn tab_size_below_one_falls_back_to_two() {
        let loaded = Settings::from_yaml("tabSize: 0\n").expect("parse");
        assert_eq!(loaded.settings.tab_size, 2);
        let loaded = Settings::from_yaml("tabSize: -4\n").expect("parse");
        assert_eq!(loaded.settings.tab_size, 2);
        let loaded = Settings::from_yaml("tabSize: 4\n").expect("parse");
        assert_eq!(loaded.settings.tab_size, 4);
    }

    #[test]
    fn malformed_profile_is_dropped_but_valid_ones_survive() {
        let yaml = format!(
            "profiles:\n  good:\n    {VALID_PROFILE}\n  bad:\n    cmdDoc: 12\n"
        );
        let loaded = Settings::from_yaml(&yaml).expect("parse");
        assert_eq!(loaded.malformed, vec!["bad".to_string()]);
        assert!(loaded.settings.resolve(&ProfileKey::from("good")).is_some());
        assert!(loaded.settings.resolve(&ProfileKey::from("default")).is_none());
    }

    #[test]
    fn all_profiles_malformed_falls_back_to_defaults() {
        let loaded = Settings::from_yaml("profiles:\n  bad:\n    args: nope\n").expect("parse");
        assert!(!loaded.is_clean());
        assert!(loaded.settings.resolve(&ProfileKey::from("default")).is_some());
    }

    #[test]
    fn role_detection_mode_uses_display_names() {
        let loaded =
            Settings::from_yaml("roleDetectionMode: Ansible Galaxy\n").expect("parse");
        assert_eq!(loaded.settings.role_detection_mode, RoleDetectionMode::Galaxy);
    }

    #[test]
    fn unknown_role_detection_mode_is_a_parse_error() {
        assert!(Settings::from_yaml("roleDetectionMode: Guess\n").is_err());
    }
}
