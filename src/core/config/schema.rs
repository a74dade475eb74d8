//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$FLEXLATE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/flexlate/config.toml`
//! 3. `~/.flexlate/config.toml`
//!
//! # Repo Config
//!
//! Located at `.git/flexlate/config.toml`.
//!
//! # Validation
//!
//! Branch names are checked against git's refname rules after parsing.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
/// merged_branch = "flexlate-output"
/// template_branch = "flexlate-templates"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// Canonical merged branch name
    pub merged_branch: Option<String>,

    /// Canonical template branch name
    pub template_branch: Option<String>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_branch("merged_branch", self.merged_branch.as_deref())?;
        validate_branch("template_branch", self.template_branch.as_deref())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// default_branch = "main"
/// remote = "origin"
/// merged_branch = "flexlate-output"
/// template_branch = "flexlate-templates"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Branch on which canonical flexlate branches are used
    pub default_branch: Option<String>,

    /// Remote name (default: "origin")
    pub remote: Option<String>,

    /// Canonical merged branch name
    pub merged_branch: Option<String>,

    /// Canonical template branch name
    pub template_branch: Option<String>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_branch("default_branch", self.default_branch.as_deref())?;
        validate_branch("merged_branch", self.merged_branch.as_deref())?;
        validate_branch("template_branch", self.template_branch.as_deref())?;

        if let Some(remote) = &self.remote {
            if remote.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "remote cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_branch(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    if let Some(name) = value {
        BranchName::new(name)
            .map_err(|e| ConfigError::InvalidValue(format!("invalid {key}: {e}")))?;
    }
    Ok(())
}
