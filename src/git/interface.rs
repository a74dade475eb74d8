//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! flexlate. Every repository read and write flows through [`Git`], which
//! returns strong types and normalizes libgit2 errors into typed failure
//! categories.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Not inside a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::NonFastForward`]: A fast-forward was required but the
//!   branches diverged
//! - [`GitError::NothingToCommit`]: A commit would not change the tree
//! - [`GitError::PushFailed`]: The `git push` subprocess failed
//!
//! # Example
//!
//! ```ignore
//! use flexlate::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let oid = git.resolve_ref("refs/heads/main")?;
//! println!("main is at {}", oid.short(7));
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{BranchName, Oid, RefName, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref moved between the snapshot and the update, so the update was
    /// refused rather than clobbering someone else's work.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        /// The ref being updated
        refname: String,
        /// The expected old value
        expected: String,
        /// The actual current value
        actual: String,
    },

    /// A fast-forward was required but the branch has diverged.
    #[error("cannot fast-forward {branch}: it has diverged from {from}")]
    NonFastForward {
        /// The branch that would have moved
        branch: String,
        /// Where it was being fast-forwarded from
        from: String,
    },

    /// A commit was requested but the tree is unchanged.
    #[error("nothing to commit")]
    NothingToCommit,

    /// Git operation in progress (rebase, merge, etc.).
    #[error("{operation} in progress")]
    OperationInProgress {
        /// The type of operation in progress
        operation: GitState,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The OID that was not found
        oid: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName {
        /// Description of the problem
        message: String,
    },

    /// Pushing to a remote failed.
    #[error("failed to push {branch}: {message}")]
    PushFailed {
        /// The branch being pushed
        branch: String,
        /// stderr from git, or the spawn error
        message: String,
    },

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError {
        /// Description of the error
        message: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") || context == "HEAD" {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn io(err: std::io::Error, path: &Path) -> Self {
        GitError::AccessError {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::Internal {
                message: err.message().to_string(),
            },
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
        }
    }
}

/// State of in-progress Git operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitState {
    /// No operation in progress.
    Clean,
    /// Rebase in progress.
    Rebase,
    /// Merge in progress.
    Merge,
    /// Cherry-pick in progress.
    CherryPick,
    /// Revert in progress.
    Revert,
    /// Bisect in progress.
    Bisect,
    /// Apply mailbox in progress.
    ApplyMailbox,
}

impl GitState {
    /// Check if any operation is in progress.
    ///
    /// # Example
    ///
    /// ```
    /// use flexlate::git::GitState;
    ///
    /// assert!(!GitState::Clean.is_in_progress());
    /// assert!(GitState::Merge.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, GitState::Clean)
    }

    /// Get a human-readable description of the state.
    pub fn description(&self) -> &'static str {
        match self {
            GitState::Clean => "clean",
            GitState::Rebase => "rebase",
            GitState::Merge => "merge",
            GitState::CherryPick => "cherry-pick",
            GitState::Revert => "revert",
            GitState::Bisect => "bisect",
            GitState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for GitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Summary of working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Number of staged changes
    pub staged: usize,
    /// Number of unstaged changes to tracked files
    pub unstaged: usize,
    /// Number of untracked files (if requested)
    pub untracked: usize,
    /// Whether there are unresolved conflicts
    pub has_conflicts: bool,
}

impl WorktreeStatus {
    /// No staged, unstaged or conflicted changes. Untracked files are
    /// ignored.
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.unstaged == 0 && !self.has_conflicts
    }

    /// Clean and with no untracked files either.
    pub fn is_pristine(&self) -> bool {
        self.is_clean() && self.untracked == 0
    }

    /// Short human description of what is dirty.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.staged > 0 {
            parts.push(format!("{} staged", self.staged));
        }
        if self.unstaged > 0 {
            parts.push(format!("{} unstaged", self.unstaged));
        }
        if self.untracked > 0 {
            parts.push(format!("{} untracked", self.untracked));
        }
        if self.has_conflicts {
            parts.push("unresolved conflicts".to_string());
        }
        parts.join(", ")
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    /// Full commit message
    pub message: String,
    /// Parent OIDs in order
    pub parents: Vec<Oid>,
}

/// What a merge into HEAD did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    /// HEAD already contains the source.
    UpToDate,
    /// HEAD moved forward to the source without a new commit.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
    /// The merge stopped with conflicts; the repository is mid-merge.
    Conflicted(Vec<PathBuf>),
}

/// The Git interface.
///
/// This is the **single point of interaction** with Git. No other module
/// imports `git2` directly.
///
/// # CAS Semantics
///
/// Branches that are not checked out are only ever moved with
/// [`Git::update_ref_cas`] / [`Git::delete_ref_cas`], so a ref that changed
/// behind our back makes the operation fail instead of being overwritten.
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

fn from_git2(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::new(oid.to_string()).map_err(|e| e.into())
}

/// Parse a date in one of the forms git accepts in `GIT_COMMITTER_DATE`:
/// `@<seconds>`, `<seconds>` or `<seconds> <+|-hhmm>`.
fn parse_git_date(value: &str) -> Option<git2::Time> {
    let value = value.trim();
    let value = value.strip_prefix('@').unwrap_or(value);
    let mut parts = value.split_whitespace();
    let seconds: i64 = parts.next()?.parse().ok()?;
    let offset_minutes = match parts.next() {
        None => 0,
        Some(tz) => {
            let (sign, digits) = if let Some(d) = tz.strip_prefix('+') {
                (1, d)
            } else {
                (-1, tz.strip_prefix('-')?)
            };
            if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let hours: i32 = digits[..2].parse().ok()?;
            let minutes: i32 = digits[2..].parse().ok()?;
            sign * (hours * 60 + minutes)
        }
    };
    if parts.next().is_some() {
        return None;
    }
    Some(git2::Time::new(seconds, offset_minutes))
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open a repository at the given path.
    ///
    /// Uses `git2::Repository::discover`, so `path` can be any directory
    /// within the repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Self::from_repo(repo)
    }

    pub(super) fn from_repo(repo: git2::Repository) -> Result<Self, GitError> {
        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        Ok(Self { repo })
    }

    /// Root of the working directory.
    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    /// Path to the .git directory.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    // =========================================================================
    // State Detection
    // =========================================================================

    /// Get the current Git state (rebase, merge, etc.).
    pub fn state(&self) -> GitState {
        match self.repo.state() {
            git2::RepositoryState::Clean => GitState::Clean,
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge => GitState::Rebase,
            git2::RepositoryState::Merge => GitState::Merge,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                GitState::CherryPick
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                GitState::Revert
            }
            git2::RepositoryState::Bisect => GitState::Bisect,
            git2::RepositoryState::ApplyMailbox | git2::RepositoryState::ApplyMailboxOrRebase => {
                GitState::ApplyMailbox
            }
        }
    }

    /// Get working tree status summary.
    ///
    /// If `include_untracked` is false, untracked files are not counted.
    pub fn worktree_status(&self, include_untracked: bool) -> Result<WorktreeStatus, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(include_untracked)
            .recurse_untracked_dirs(include_untracked)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, "status"))?;

        let mut result = WorktreeStatus::default();

        for entry in statuses.iter() {
            let status = entry.status();

            if status.is_conflicted() {
                result.has_conflicts = true;
            }

            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
            {
                result.staged += 1;
            }

            if status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                result.unstaged += 1;
            }

            if status.is_wt_new() {
                result.untracked += 1;
            }
        }

        Ok(result)
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        from_git2(oid)
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tip of a local branch, or None if the branch does not exist.
    pub fn branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.try_resolve_ref(RefName::for_branch(branch).as_str())
    }

    /// Get HEAD commit OID.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if HEAD is unborn (new repository)
    pub fn head_oid(&self) -> Result<Oid, GitError> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;

        let oid = head
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?
            .id();

        from_git2(oid)
    }

    /// Whether HEAD points at a commit at all.
    pub fn has_commits(&self) -> Result<bool, GitError> {
        match self.repo.head() {
            Ok(_) => Ok(true),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(GitError::from_git2(e, "HEAD")),
        }
    }

    /// Get the current branch name, if on a branch.
    ///
    /// Returns `None` if HEAD is detached or unborn.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }

        Ok(None)
    }

    /// The branch `refs/remotes/<remote>/HEAD` points at, if it is set.
    pub fn remote_head_branch(&self, remote: &str) -> Result<Option<BranchName>, GitError> {
        let refname = format!("refs/remotes/{remote}/HEAD");
        let reference = match self.repo.find_reference(&refname) {
            Ok(r) => r,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, &refname)),
        };
        let prefix = format!("refs/remotes/{remote}/");
        Ok(reference
            .symbolic_target()
            .and_then(|target| target.strip_prefix(&prefix))
            .and_then(|name| BranchName::new(name).ok()))
    }

    // =========================================================================
    // CAS Ref Operations
    // =========================================================================

    /// Update a ref with compare-and-swap semantics.
    ///
    /// The update only succeeds if the ref's current value matches
    /// `expected_old`. If `expected_old` is `None`, the ref must not exist.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let current = self.try_resolve_ref_raw(refname)?;

        match (expected_old, current.as_ref()) {
            (Some(expected), Some(actual)) if expected.as_str() != actual => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: actual.clone(),
                });
            }
            (Some(expected), None) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected.to_string(),
                    actual: "<none>".to_string(),
                });
            }
            (None, Some(actual)) => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: "<none>".to_string(),
                    actual: actual.clone(),
                });
            }
            _ => {}
        }

        let oid = to_git2(new_oid)?;
        self.repo
            .reference(refname, oid, true, message)
            .map_err(|e| GitError::from_git2(e, refname))?;

        tracing::debug!(refname, oid = %new_oid, "updated ref");
        Ok(())
    }

    /// Delete a ref with compare-and-swap semantics.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn delete_ref_cas(&self, refname: &str, expected_old: &Oid) -> Result<(), GitError> {
        match self.try_resolve_ref_raw(refname)? {
            None => {
                return Err(GitError::RefNotFound {
                    refname: refname.to_string(),
                });
            }
            Some(actual) if actual != expected_old.as_str() => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected_old.to_string(),
                    actual,
                });
            }
            _ => {}
        }

        let mut reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        reference
            .delete()
            .map_err(|e| GitError::from_git2(e, refname))?;

        tracing::debug!(refname, "deleted ref");
        Ok(())
    }

    /// Point `branch` at `tip`, or delete it when `tip` is None, regardless
    /// of where it points now. Used only to restore snapshots.
    pub fn force_branch(&self, branch: &BranchName, tip: Option<&Oid>) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        match (tip, self.try_resolve_ref_raw(refname.as_str())?) {
            (Some(tip), _) => {
                self.repo
                    .reference(refname.as_str(), to_git2(tip)?, true, "flexlate: restore")
                    .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
            }
            (None, Some(_)) => {
                let mut reference = self
                    .repo
                    .find_reference(refname.as_str())
                    .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
                reference
                    .delete()
                    .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Ancestry Queries
    // =========================================================================

    /// Check if `ancestor` is an ancestor of `descendant`.
    ///
    /// Returns true if ancestor == descendant.
    pub fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(to_git2(descendant)?, to_git2(ancestor)?)
            .map_err(|e| GitError::from_git2(e, "graph_descendant_of"))
    }

    /// Commits reachable from `tip` but not from `hide`, newest first.
    pub fn commits_between(&self, hide: Option<&Oid>, tip: &Oid) -> Result<Vec<Oid>, GitError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL)
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        revwalk
            .push(to_git2(tip)?)
            .map_err(|e| GitError::from_git2(e, tip.as_str()))?;
        if let Some(hide) = hide {
            revwalk
                .hide(to_git2(hide)?)
                .map_err(|e| GitError::from_git2(e, hide.as_str()))?;
        }

        revwalk
            .map(|oid| {
                oid.map_err(|e| GitError::from_git2(e, "revwalk"))
                    .and_then(from_git2)
            })
            .collect()
    }

    /// The root commit at the end of HEAD's first-parent chain.
    pub fn root_commit(&self) -> Result<Oid, GitError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::from_git2(e, "revwalk"))?;
        revwalk.simplify_first_parent()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
        revwalk
            .push_head()
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        match revwalk.next() {
            Some(oid) => from_git2(oid.map_err(|e| GitError::from_git2(e, "revwalk"))?),
            None => Err(GitError::RefNotFound {
                refname: "HEAD".to_string(),
            }),
        }
    }

    // =========================================================================
    // Commit Information
    // =========================================================================

    /// Get information about a commit.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the commit doesn't exist
    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        let parents = commit
            .parent_ids()
            .map(from_git2)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            parents,
        })
    }

    /// Get the parent OIDs of a commit.
    pub fn commit_parents(&self, oid: &Oid) -> Result<Vec<Oid>, GitError> {
        Ok(self.commit_info(oid)?.parents)
    }

    // =========================================================================
    // Branches and Checkout
    // =========================================================================

    /// Create a branch at `at`. Fails if it already exists.
    pub fn create_branch(&self, branch: &BranchName, at: &Oid) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        self.update_ref_cas(refname.as_str(), at, None, "flexlate: create branch")
    }

    /// Delete a local branch, checking it still points at `expected`.
    pub fn delete_branch(&self, branch: &BranchName, expected: &Oid) -> Result<(), GitError> {
        self.delete_ref_cas(RefName::for_branch(branch).as_str(), expected)
    }

    /// Check out an existing branch, updating the working tree.
    ///
    /// Uses a safe checkout, so local modifications that would be
    /// overwritten make this fail instead of being lost.
    pub fn checkout_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let refname = RefName::for_branch(branch);
        let commit = self
            .repo
            .find_reference(refname.as_str())
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;
        self.repo
            .set_head(refname.as_str())
            .map_err(|e| GitError::from_git2(e, refname.as_str()))?;

        tracing::debug!(branch = %branch, "checked out");
        Ok(())
    }

    /// Move the checked-out branch and working tree to `target`,
    /// discarding any in-progress merge.
    pub fn reset_hard(&self, target: &Oid) -> Result<(), GitError> {
        let object = self
            .repo
            .find_object(to_git2(target)?, Some(git2::ObjectType::Commit))
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(&object, git2::ResetType::Hard, Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .cleanup_state()
            .map_err(|e| GitError::from_git2(e, "cleanup_state"))?;

        tracing::debug!(oid = %target, "reset --hard");
        Ok(())
    }

    /// Re-read the index from disk.
    ///
    /// The index is cached per repository handle, so changes made by another
    /// process (the git binary, an editor integration) are invisible until
    /// it is reloaded.
    pub fn reload_index(&self) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .read(true)
            .map_err(|e| GitError::from_git2(e, "index"))
    }

    /// Abandon an in-progress merge, restoring HEAD's tree.
    pub fn abort_merge(&self) -> Result<(), GitError> {
        let head = self.head_oid()?;
        self.reset_hard(&head)
    }

    // =========================================================================
    // Working Tree Content
    // =========================================================================

    /// Delete every file the index tracks from the working tree, along with
    /// directories left empty by the deletion.
    pub fn remove_tracked_files(&self) -> Result<(), GitError> {
        let work_dir = self.work_dir()?.to_path_buf();
        let index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;

        for entry in index.iter() {
            let relative = String::from_utf8(entry.path).map_err(|_| GitError::AccessError {
                message: "index contains a non UTF-8 path".to_string(),
            })?;
            let path = work_dir.join(&relative);
            if path.symlink_metadata().is_ok() {
                std::fs::remove_file(&path).map_err(|e| GitError::io(e, &path))?;
            }

            let mut dir = path.parent();
            while let Some(d) = dir {
                if d == work_dir || std::fs::remove_dir(d).is_err() {
                    break;
                }
                dir = d.parent();
            }
        }

        Ok(())
    }

    /// Write every file in `commit`'s tree into the working tree and index
    /// without moving HEAD.
    pub fn restore_files_from(&self, commit: &Oid) -> Result<(), GitError> {
        let tree = self
            .repo
            .find_commit(to_git2(commit)?)
            .and_then(|c| c.tree())
            .map_err(|e| GitError::from_git2(e, commit.as_str()))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, commit.as_str()))
    }

    /// Stage every change in the working tree, including deletions and new
    /// files.
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .map_err(|e| GitError::from_git2(e, "add_all"))?;
        index
            .update_all(["*"], None)
            .map_err(|e| GitError::from_git2(e, "update_all"))?;
        index.write().map_err(|e| GitError::from_git2(e, "index"))
    }

    /// Stage everything and commit it on the checked-out branch.
    ///
    /// # Errors
    ///
    /// - [`GitError::NothingToCommit`] if the staged tree equals HEAD's tree
    pub fn commit_all(&self, message: &str) -> Result<Oid, GitError> {
        self.stage_all()?;
        let head = self.head_oid()?;
        self.commit_index(message, &[head], true)
    }

    /// Commit a resolved merge of `merged_in` into HEAD with both parents,
    /// staging whatever is in the working tree.
    pub fn commit_merge(&self, message: &str, merged_in: &Oid) -> Result<Oid, GitError> {
        self.stage_all()?;
        let head = self.head_oid()?;
        let oid = self.commit_index(message, &[head, merged_in.clone()], false)?;
        self.repo
            .cleanup_state()
            .map_err(|e| GitError::from_git2(e, "cleanup_state"))?;
        Ok(oid)
    }

    fn commit_index(
        &self,
        message: &str,
        parents: &[Oid],
        reject_empty: bool,
    ) -> Result<Oid, GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "write_tree"))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GitError::from_git2(e, "tree"))?;

        let parent_commits = parents
            .iter()
            .map(|p| {
                self.repo
                    .find_commit(to_git2(p)?)
                    .map_err(|e| GitError::from_git2(e, p.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if reject_empty
            && parent_commits
                .first()
                .is_some_and(|first| first.tree_id() == tree_id)
        {
            return Err(GitError::NothingToCommit);
        }

        let signature = self.signature()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parent_refs,
            )
            .map_err(|e| GitError::from_git2(e, "commit"))?;

        let oid = from_git2(oid)?;
        tracing::debug!(oid = %oid, parents = parents.len(), "committed");
        Ok(oid)
    }

    /// Merge `source` into the checked-out branch.
    ///
    /// Fast-forwards when possible. A true merge is committed with `message`
    /// unless it conflicts, in which case conflict markers are left in the
    /// working tree and the repository stays mid-merge.
    pub fn merge_into_head(&self, source: &Oid, message: &str) -> Result<MergeStatus, GitError> {
        let annotated = self
            .repo
            .find_annotated_commit(to_git2(source)?)
            .map_err(|e| GitError::from_git2(e, source.as_str()))?;
        let (analysis, _) = self
            .repo
            .merge_analysis(&[&annotated])
            .map_err(|e| GitError::from_git2(e, "merge_analysis"))?;

        if analysis.is_up_to_date() {
            return Ok(MergeStatus::UpToDate);
        }

        if analysis.is_fast_forward() {
            let target = self
                .repo
                .find_commit(annotated.id())
                .map_err(|e| GitError::from_git2(e, source.as_str()))?;
            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.safe();
            self.repo
                .checkout_tree(target.as_object(), Some(&mut checkout))
                .map_err(|e| GitError::from_git2(e, source.as_str()))?;
            let mut head = self
                .repo
                .head()
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            head.set_target(annotated.id(), "flexlate: fast-forward")
                .map_err(|e| GitError::from_git2(e, "HEAD"))?;
            return Ok(MergeStatus::FastForward(source.clone()));
        }

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout
            .safe()
            .allow_conflicts(true)
            .conflict_style_merge(true);
        self.repo
            .merge(&[&annotated], None, Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, "merge"))?;
        // libgit2 names the merged-in commit by sha. Whoever concludes the
        // merge, `git commit --no-edit` included, must get `message`.
        let merge_msg = self.repo.path().join("MERGE_MSG");
        std::fs::write(&merge_msg, message).map_err(|e| GitError::io(e, &merge_msg))?;

        let index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index
                .conflicts()
                .map_err(|e| GitError::from_git2(e, "conflicts"))?
            {
                let conflict = conflict.map_err(|e| GitError::from_git2(e, "conflicts"))?;
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    paths.push(PathBuf::from(String::from_utf8_lossy(&entry.path).as_ref()));
                }
            }
            tracing::debug!(source = %source, conflicts = paths.len(), "merge stopped");
            return Ok(MergeStatus::Conflicted(paths));
        }

        self.commit_merge(message, source).map(MergeStatus::Merged)
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Fetch `branch` from the repository at `source` and return its tip.
    ///
    /// The fetched ref lands under `refs/flexlate/incoming/` and is removed
    /// again once read; the objects stay.
    pub fn fetch_branch_from(&self, source: &Path, branch: &BranchName) -> Result<Oid, GitError> {
        let url = source.to_str().ok_or_else(|| GitError::AccessError {
            message: format!("path is not UTF-8: {}", source.display()),
        })?;
        let incoming = RefName::for_incoming(branch);
        let refspec = format!("+{}:{}", RefName::for_branch(branch), incoming);

        let mut remote = self
            .repo
            .remote_anonymous(url)
            .map_err(|e| GitError::from_git2(e, url))?;
        remote
            .fetch(&[refspec.as_str()], None, None)
            .map_err(|e| GitError::from_git2(e, "fetch"))?;

        let tip = self.resolve_ref(incoming.as_str())?;
        self.delete_ref_cas(incoming.as_str(), &tip)?;
        Ok(tip)
    }

    /// Push `branch` to `remote` with the git binary, so credential helpers
    /// and transport configuration apply.
    pub fn push_branch(&self, remote: &str, branch: &BranchName) -> Result<(), GitError> {
        let refspec = format!("{0}:{0}", branch.as_str());
        let output = std::process::Command::new("git")
            .args(["push", "-u", remote, &refspec])
            .current_dir(self.work_dir()?)
            .output()
            .map_err(|e| GitError::PushFailed {
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GitError::PushFailed {
                branch: branch.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Configured `(user.name, user.email)`, if both are set.
    pub fn identity(&self) -> Option<(String, String)> {
        let config = self.repo.config().ok()?;
        let name = config.get_string("user.name").ok()?;
        let email = config.get_string("user.email").ok()?;
        Some((name, email))
    }

    /// Set `user.name` / `user.email` in this repository's local config.
    pub(super) fn set_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        let mut config = self
            .repo
            .config()
            .map_err(|e| GitError::from_git2(e, "config"))?;
        config
            .set_str("user.name", name)
            .and_then(|_| config.set_str("user.email", email))
            .map_err(|e| GitError::from_git2(e, "config"))
    }

    /// Signature for new commits. Honors `GIT_COMMITTER_DATE` (then
    /// `GIT_AUTHOR_DATE`) the way git does, so commits can be reproduced
    /// byte for byte.
    fn signature(&self) -> Result<git2::Signature<'static>, GitError> {
        let (name, email) = self.identity().ok_or_else(|| GitError::Internal {
            message: "no commit identity: set user.name and user.email".to_string(),
        })?;

        let fixed = ["GIT_COMMITTER_DATE", "GIT_AUTHOR_DATE"]
            .iter()
            .find_map(|var| std::env::var(var).ok().and_then(|v| parse_git_date(&v)));

        match fixed {
            Some(time) => git2::Signature::new(&name, &email, &time),
            None => git2::Signature::now(&name, &email),
        }
        .map_err(|e| GitError::from_git2(e, "signature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        #[test]
        fn error_display_formatting() {
            let err = GitError::CasFailed {
                refname: "refs/heads/main".to_string(),
                expected: "abc".to_string(),
                actual: "def".to_string(),
            };
            assert!(err.to_string().contains("CAS failed"));
            assert!(err.to_string().contains("refs/heads/main"));

            let err = GitError::NonFastForward {
                branch: "flexlate-output".to_string(),
                from: "main".to_string(),
            };
            assert!(err.to_string().contains("diverged"));
        }

        #[test]
        fn type_errors_map_to_git_errors() {
            let err: GitError = TypeError::InvalidOid("bad".into()).into();
            assert!(matches!(err, GitError::InvalidOid { .. }));
            let err: GitError = TypeError::InvalidBranchName("bad".into()).into();
            assert!(matches!(err, GitError::InvalidRefName { .. }));
        }
    }

    mod git_state {
        use super::*;

        #[test]
        fn in_progress() {
            assert!(!GitState::Clean.is_in_progress());
            assert!(GitState::Merge.is_in_progress());
            assert!(GitState::Rebase.is_in_progress());
            assert_eq!(GitState::CherryPick.to_string(), "cherry-pick");
        }
    }

    mod worktree_status {
        use super::*;

        #[test]
        fn untracked_is_clean_but_not_pristine() {
            let status = WorktreeStatus {
                untracked: 2,
                ..Default::default()
            };
            assert!(status.is_clean());
            assert!(!status.is_pristine());
            assert_eq!(status.describe(), "2 untracked");
        }

        #[test]
        fn conflicts_make_dirty() {
            let status = WorktreeStatus {
                has_conflicts: true,
                ..Default::default()
            };
            assert!(!status.is_clean());
        }
    }

    mod git_date {
        use super::*;

        #[test]
        fn accepted_forms() {
            let t = parse_git_date("@1700000000").unwrap();
            assert_eq!((t.seconds(), t.offset_minutes()), (1_700_000_000, 0));

            let t = parse_git_date("1700000000 +0130").unwrap();
            assert_eq!(t.offset_minutes(), 90);

            let t = parse_git_date("1700000000 -0800").unwrap();
            assert_eq!(t.offset_minutes(), -480);
        }

        #[test]
        fn rejected_forms() {
            for value in ["", "yesterday", "1700000000 0800", "1700000000 +08", "1 +0000 x"] {
                assert!(parse_git_date(value).is_none(), "{value:?}");
            }
        }
    }
}
