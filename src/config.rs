//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/obtree/obtree.toml`
//! 3. Explicit config file passed to [`Settings::load`]
//! 4. Environment variables: `OBTREE_*` prefix

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::util::path::PathExt;

/// One definition root: a directory and the namespace of its identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub namespace: String,
}

/// Raw root settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawRootSettings {
    pub path: Option<PathBuf>,
    pub namespace: Option<String>,
}

/// Raw settings for intermediate parsing (Option to detect "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub primary: RawRootSettings,
    pub extends: Option<Vec<RootSettings>>,
    pub overrides: Option<Vec<RootSettings>>,
    pub ignores: Option<Vec<String>>,
}

/// Unified configuration for obtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root whose top-level units define the valid tree names
    pub primary: RootSettings,
    /// Roots applied before the primary root (primary overrides them)
    pub extends: Vec<RootSettings>,
    /// Roots applied after the primary root (they override it)
    pub overrides: Vec<RootSettings>,
    /// Qualified listener identifiers never registered
    pub ignores: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary: RootSettings {
                path: PathBuf::from("observers"),
                namespace: "app".into(),
            },
            extends: vec![],
            overrides: vec![],
            ignores: vec![],
        }
    }
}

/// Get the XDG config directory for obtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "obtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("obtree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are added to base
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
    /// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = base.iter().cloned().collect();

        for pattern in overlay {
            if let Some(negated) = pattern.strip_prefix('!') {
                result.remove(negated);
            } else {
                result.insert(pattern.clone());
            }
        }

        // Convert to sorted Vec for deterministic output
        let mut vec: Vec<String> = result.into_iter().collect();
        vec.sort();
        vec
    }

    /// Merge overlay config onto self (base).
    ///
    /// - Primary root fields: overlay wins if Some
    /// - Root lists: overlay replaces if specified
    /// - Ignores: union merge with negation support
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            primary: RootSettings {
                path: overlay
                    .primary
                    .path
                    .clone()
                    .unwrap_or_else(|| self.primary.path.clone()),
                namespace: overlay
                    .primary
                    .namespace
                    .clone()
                    .unwrap_or_else(|| self.primary.namespace.clone()),
            },
            extends: overlay
                .extends
                .clone()
                .unwrap_or_else(|| self.extends.clone()),
            overrides: overlay
                .overrides
                .clone()
                .unwrap_or_else(|| self.overrides.clone()),
            ignores: overlay
                .ignores
                .as_ref()
                .map(|o| Self::merge_array(&self.ignores, o))
                .unwrap_or_else(|| self.ignores.clone()),
        }
    }

    /// Expand shell variables and tilde in all root paths.
    fn expand_paths(&mut self) {
        for root in std::iter::once(&mut self.primary)
            .chain(self.extends.iter_mut())
            .chain(self.overrides.iter_mut())
        {
            root.path = root.path.expanded();
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional explicit config file; must exist if given
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Explicit config
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }

        // 4. Environment variables (replace, explicit override)
        current = Self::apply_env_overrides(current)?;

        current.expand_paths();
        Ok(current)
    }

    /// Load settings from a single file on top of the defaults only.
    ///
    /// Skips global config and environment variables.
    pub fn from_file(path: &Path) -> Result<Self, ApplicationError> {
        let raw = load_raw_settings(path)?;
        let mut settings = Self::default().merge_with(&raw);
        settings.expand_paths();
        Ok(settings)
    }

    /// Apply OBTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(settings: Self) -> Result<Self, ApplicationError> {
        Self::apply_environment(settings, env_source())
    }

    fn apply_environment(mut settings: Self, env: Environment) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(env)
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("primary.path") {
            settings.primary.path = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("primary.namespace") {
            settings.primary.namespace = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("ignores") {
            settings.ignores = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# obtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/obtree/obtree.toml
#   File:   explicit path handed to Settings::load
#   Env:    OBTREE_* environment variables (OBTREE_PRIMARY__PATH, OBTREE_IGNORES=a,b)
#
# Roots are applied in the order: extends, primary, overrides.
# A later root overrides listener patience and type of an earlier one.

# Root whose top-level directories name the observer trees
[primary]
path = "observers"
namespace = "app"

# Roots applied before the primary root
# [[extends]]
# path = "~/vendor/observers"
# namespace = "vendor"

# Roots applied after the primary root
# [[overrides]]
# path = "local/observers"
# namespace = "app"

# Qualified listener identifiers to skip (use "!id" to drop an inherited entry)
# ignores = ["app::checkout::payment::Audit"]
"#
        .to_string()
    }
}

/// `OBTREE_PRIMARY__PATH` maps to `primary.path`; `OBTREE_IGNORES` is a
/// comma separated list.
fn env_source() -> Environment {
    Environment::with_prefix("OBTREE")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("ignores")
        .try_parsing(true)
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
