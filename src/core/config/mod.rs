//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Flexlate has two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Repository-level overrides
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$FLEXLATE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/flexlate/config.toml`
//! 3. `~/.flexlate/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use flexlate::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/repo"))).unwrap();
//! let config = result.config;
//!
//! println!("Merged branch: {}", config.merged_branch().unwrap());
//! println!("Remote: {}", config.remote());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, RepoConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::naming::{DEFAULT_MERGED_BRANCH, DEFAULT_TEMPLATE_BRANCH};
use crate::core::types::BranchName;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence; repo config overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if in a repo)
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `repo_path` is provided, also loads repo-specific config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(repo_path: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let (global, global_path) = match Self::global_candidates().into_iter().find(|p| p.exists())
        {
            Some(path) => (Self::read_toml::<GlobalConfig>(&path)?, Some(path)),
            None => (GlobalConfig::default(), None),
        };

        let (repo, repo_path_found) = match repo_path.map(Self::repo_config_path) {
            Some(path) if path.exists() => (Some(Self::read_toml::<RepoConfig>(&path)?), Some(path)),
            _ => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        tracing::debug!(
            global = ?global_path,
            repo = ?repo_path_found,
            "loaded configuration"
        );

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path,
                repo_path: repo_path_found,
            },
        })
    }

    /// Global config locations in search order.
    fn global_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("FLEXLATE_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("flexlate/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".flexlate/config.toml"));
        }
        candidates
    }

    fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for repo config.
    ///
    /// Returns `.git/flexlate/config.toml` relative to the given repo path.
    pub fn repo_config_path(repo_path: &Path) -> PathBuf {
        repo_path.join(".git/flexlate/config.toml")
    }

    /// Write repo config atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file and
    /// renames it into place.
    pub fn write_repo(repo_path: &Path, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::repo_config_path(repo_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let write = |p: &Path| -> std::io::Result<()> {
            let mut file = fs::File::create(p)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        };
        write(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, &path).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        Ok(path)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn branch_setting(
        &self,
        repo: Option<&str>,
        global: Option<&str>,
        default: &str,
    ) -> Result<BranchName, ConfigError> {
        let name = repo.or(global).unwrap_or(default);
        BranchName::new(name).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Canonical merged branch. Defaults to `flexlate-output`.
    pub fn merged_branch(&self) -> Result<BranchName, ConfigError> {
        self.branch_setting(
            self.repo.as_ref().and_then(|r| r.merged_branch.as_deref()),
            self.global.merged_branch.as_deref(),
            DEFAULT_MERGED_BRANCH,
        )
    }

    /// Canonical template branch. Defaults to `flexlate-templates`.
    pub fn template_branch(&self) -> Result<BranchName, ConfigError> {
        self.branch_setting(
            self.repo.as_ref().and_then(|r| r.template_branch.as_deref()),
            self.global.template_branch.as_deref(),
            DEFAULT_TEMPLATE_BRANCH,
        )
    }

    /// Configured default branch, if any.
    pub fn default_branch(&self) -> Option<BranchName> {
        self.repo
            .as_ref()
            .and_then(|r| r.default_branch.as_deref())
            .and_then(|name| BranchName::new(name).ok())
    }

    /// Get the remote name.
    ///
    /// Defaults to "origin" if not configured.
    pub fn remote(&self) -> &str {
        self.repo
            .as_ref()
            .and_then(|r| r.remote.as_deref())
            .unwrap_or("origin")
    }

    /// Check if interactive mode is enabled by default.
    ///
    /// Defaults to `true` if not configured.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_files() {
        let config = Config::default();
        assert_eq!(config.merged_branch().unwrap().as_str(), "flexlate-output");
        assert_eq!(
            config.template_branch().unwrap().as_str(),
            "flexlate-templates"
        );
        assert_eq!(config.remote(), "origin");
        assert!(config.default_branch().is_none());
        assert!(config.interactive());
    }

    #[test]
    fn load_repo_config() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".git/flexlate");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("config.toml"),
            r#"
            default_branch = "main"
            remote = "upstream"
            merged_branch = "out"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(temp.path())).unwrap().config;

        assert_eq!(config.default_branch().unwrap().as_str(), "main");
        assert_eq!(config.remote(), "upstream");
        assert_eq!(config.merged_branch().unwrap().as_str(), "out");
        assert!(config.repo_config_loaded_from().is_some());
    }

    #[test]
    fn write_then_load() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();

        let repo = RepoConfig {
            template_branch: Some("tpl".to_string()),
            ..Default::default()
        };
        let path = Config::write_repo(temp.path(), &repo).unwrap();
        assert!(path.exists());

        let config = Config::load(Some(temp.path())).unwrap().config;
        assert_eq!(config.template_branch().unwrap().as_str(), "tpl");
    }

    #[test]
    fn invalid_branch_rejected_on_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".git/flexlate");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "merged_branch = \"bad..name\"").unwrap();

        assert!(matches!(
            Config::load(Some(temp.path())),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".git/flexlate");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.toml"), "remote = ").unwrap();

        assert!(matches!(
            Config::load(Some(temp.path())),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn repo_overrides_global() {
        let config = Config {
            global: GlobalConfig {
                merged_branch: Some("global-out".to_string()),
                template_branch: Some("global-tpl".to_string()),
                ..Default::default()
            },
            repo: Some(RepoConfig {
                merged_branch: Some("repo-out".to_string()),
                ..Default::default()
            }),
            global_path: None,
            repo_path: None,
        };

        assert_eq!(config.merged_branch().unwrap().as_str(), "repo-out");
        assert_eq!(config.template_branch().unwrap().as_str(), "global-tpl");
    }
}
