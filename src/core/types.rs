//! core::types
//!
//! Strong types for the values the protocol passes around.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`RefName`] - Validated Git reference name
//! - [`Fingerprint`] - Hash over a set of branch tips, used to prove that a
//!   rolled-back repository is sha-identical to its starting point
//!
//! # Examples
//!
//! ```
//! use flexlate::core::types::{BranchName, Oid, RefName};
//!
//! let branch = BranchName::new("flexlate-output").unwrap();
//! let scoped = branch.feature_scoped(&BranchName::new("feature").unwrap());
//! assert_eq!(scoped.as_str(), "flexlate-output-feature");
//! assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/flexlate-output");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// Check a name against the subset of `git check-ref-format` rules that
/// apply to both branch names and full ref names.
///
/// Returns a description of the first violated rule.
fn check_ref_format(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name == "@" {
        return Err("cannot be '@'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("cannot start or end with '/'".into());
    }
    if name.ends_with('.') {
        return Err("cannot end with '.'".into());
    }
    for forbidden in ["..", "@{", "//"] {
        if name.contains(forbidden) {
            return Err(format!("cannot contain '{forbidden}'"));
        }
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '\\' | '?' | '*' | '['))
    {
        return Err(format!("cannot contain {c:?}"));
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A validated Git branch name (the part after `refs/heads/`).
///
/// # Example
///
/// ```
/// use flexlate::core::types::BranchName;
///
/// assert!(BranchName::new("feature/login").is_ok());
/// assert!(BranchName::new("-flag").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_ref_format(&name)
            .map_err(|rule| TypeError::InvalidBranchName(format!("branch name {rule}")))?;
        Ok(Self(name))
    }

    /// The feature-scoped variant of this (canonical) branch:
    /// `<canonical>-<feature>`.
    pub fn feature_scoped(&self, feature: &BranchName) -> BranchName {
        // Both halves are valid and '-' is a valid joiner.
        BranchName(format!("{}-{}", self.0, feature.0))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for BranchName {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Git object identifier, normalized to lowercase hex.
///
/// # Example
///
/// ```
/// use flexlate::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` unless the value is 40 (SHA-1) or
    /// 64 (SHA-256) hex characters.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Abbreviated form: the first `len` characters.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated full Git reference name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Namespace for commits fetched out of ephemeral clones before they are
    /// published onto a branch.
    pub const INCOMING_PREFIX: &'static str = "refs/flexlate/incoming/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_ref_format(&name)
            .map_err(|rule| TypeError::InvalidRefName(format!("ref name {rule}")))?;
        Ok(Self(name))
    }

    /// `refs/heads/<branch>`
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("refs/heads/{}", branch.as_str()))
    }

    /// `refs/flexlate/incoming/<branch>`
    pub fn for_incoming(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::INCOMING_PREFIX, branch.as_str()))
    }

    /// `refs/remotes/<remote>/<branch>`
    pub fn for_remote_branch(remote: &str, branch: &BranchName) -> Self {
        Self(format!("refs/remotes/{}/{}", remote, branch.as_str()))
    }

    /// Strip a prefix from the ref name and return the remainder.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stable hash over `(branch, tip)` pairs.
///
/// Missing branches hash distinctly from every present tip, so deleting a
/// branch changes the fingerprint.
///
/// # Example
///
/// ```
/// use flexlate::core::types::{BranchName, Fingerprint, Oid};
///
/// let main = BranchName::new("main").unwrap();
/// let tip = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
///
/// let a = Fingerprint::compute(&[(main.clone(), Some(tip.clone()))]);
/// let b = Fingerprint::compute(&[(main.clone(), None)]);
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint. Input order does not matter.
    pub fn compute(tips: &[(BranchName, Option<Oid>)]) -> Self {
        let mut sorted: Vec<_> = tips.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        for (branch, tip) in sorted {
            hasher.update(branch.as_str().as_bytes());
            hasher.update(b"\0");
            match tip {
                Some(oid) => hasher.update(oid.as_str().as_bytes()),
                None => hasher.update(b"-"),
            }
            hasher.update(b"\n");
        }

        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
