//! git::ephemeral
//!
//! Throwaway clones used to mutate branches in isolation.
//!
//! A clone lives in its own temporary directory and is deleted when the
//! [`EphemeralClone`] is dropped. Results leave the clone only by being
//! fetched back into the real repository.

use std::path::Path;

use tempfile::TempDir;

use super::interface::{Git, GitError};
use crate::core::types::{BranchName, Oid};

/// A local clone of a repository in a temporary directory.
#[derive(Debug)]
pub struct EphemeralClone {
    git: Git,
    // Declared after `git` so the repository handle closes before the
    // directory is removed.
    _dir: TempDir,
}

impl EphemeralClone {
    /// Clone `source` into a fresh temporary directory.
    ///
    /// The clone inherits the source's commit identity so commits made in
    /// it look the same as commits made in the real repository.
    pub fn of(source: &Git) -> Result<Self, GitError> {
        let dir = tempfile::Builder::new()
            .prefix("flexlate-")
            .tempdir()
            .map_err(|e| GitError::AccessError {
                message: format!("cannot create temporary directory: {e}"),
            })?;
        let path = dir.path().join("repo");

        let url = source.git_dir().to_str().ok_or_else(|| GitError::AccessError {
            message: format!("path is not UTF-8: {}", source.git_dir().display()),
        })?;
        let repo = git2::build::RepoBuilder::new()
            .clone(url, &path)
            .map_err(|e| GitError::Internal {
                message: format!("clone of {url} failed: {}", e.message()),
            })?;
        let git = Git::from_repo(repo)?;

        if let Some((name, email)) = source.identity() {
            git.set_identity(&name, &email)?;
        }

        tracing::debug!(path = %path.display(), "created ephemeral clone");
        Ok(Self { git, _dir: dir })
    }

    /// The clone's Git interface.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Working directory of the clone.
    pub fn path(&self) -> Result<&Path, GitError> {
        self.git.work_dir()
    }

    /// Check out `branch` in the clone, first pointing it at `tip`.
    ///
    /// The branch is created if the clone does not have it yet.
    pub fn checkout_at(&self, branch: &BranchName, tip: &Oid) -> Result<(), GitError> {
        self.git.force_branch(branch, Some(tip))?;
        self.git.checkout_branch(branch)
    }
}
