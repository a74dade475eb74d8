//! engine::gate
//!
//! Precondition gating for protocol operations.
//!
//! Each operation declares a [`RequirementSet`]. Gating checks every
//! requirement against the live repository before anything is captured or
//! mutated, and fails with the first unmet precondition.
//!
//! # Example
//!
//! ```ignore
//! use flexlate::engine::gate::{gate, requirements};
//!
//! gate(&git, &names, &requirements::MUTATING)?;
//! ```

use super::error::EngineError;
use crate::core::naming::BranchNames;
use crate::git::Git;

/// One thing that must hold before an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// HEAD points at a commit
    HasCommits,
    /// HEAD is a branch, and it is the operation's active branch
    OnActiveBranch,
    /// No merge, rebase or similar is underway
    NoOperationInProgress,
    /// No staged, unstaged or untracked changes
    PristineWorktree,
    /// The active branch is not one flexlate manages
    NotOnFlexlateBranch,
}

/// The requirements an operation declares.
#[derive(Debug, Clone)]
pub struct RequirementSet {
    pub name: &'static str,
    pub requirements: &'static [Requirement],
}

impl RequirementSet {
    pub const fn new(name: &'static str, requirements: &'static [Requirement]) -> Self {
        Self { name, requirements }
    }
}

/// Predefined requirement sets.
pub mod requirements {
    use super::*;

    /// Operations that rewrite branches and touch the working tree
    /// (apply, merge, undo).
    pub const MUTATING: RequirementSet = RequirementSet::new(
        "mutating",
        &[
            Requirement::HasCommits,
            Requirement::OnActiveBranch,
            Requirement::NoOperationInProgress,
            Requirement::NotOnFlexlateBranch,
            Requirement::PristineWorktree,
        ],
    );

    /// Operations that only read local branches (push).
    pub const READ_ONLY: RequirementSet =
        RequirementSet::new("read-only", &[Requirement::HasCommits]);
}

/// Check every requirement in `set`.
pub fn gate(git: &Git, names: &BranchNames, set: &RequirementSet) -> Result<(), EngineError> {
    for requirement in set.requirements {
        check(git, names, *requirement)?;
    }
    tracing::debug!(requirements = set.name, "gate passed");
    Ok(())
}

fn check(git: &Git, names: &BranchNames, requirement: Requirement) -> Result<(), EngineError> {
    match requirement {
        Requirement::HasCommits => {
            if !git.has_commits()? {
                return Err(EngineError::NoCommits);
            }
        }
        Requirement::OnActiveBranch => match git.current_branch()? {
            None => return Err(EngineError::DetachedHead),
            Some(current) if current != names.active => {
                return Err(EngineError::NotOnActiveBranch {
                    expected: names.active.to_string(),
                    actual: current.to_string(),
                });
            }
            Some(_) => {}
        },
        Requirement::NoOperationInProgress => {
            let state = git.state();
            if state.is_in_progress() {
                return Err(EngineError::OperationInProgress { operation: state });
            }
        }
        Requirement::PristineWorktree => {
            let status = git.worktree_status(true)?;
            if !status.is_pristine() {
                return Err(EngineError::DirtyWorkingTree {
                    details: status.describe(),
                });
            }
        }
        Requirement::NotOnFlexlateBranch => {
            let active = &names.active;
            if names.is_canonical(active) || *active == names.merged || *active == names.template
            {
                return Err(EngineError::OnFlexlateBranch {
                    branch: active.to_string(),
                });
            }
        }
    }
    Ok(())
}
