//! engine::conflict
//!
//! The suspension point for merge conflicts.
//!
//! A conflict is not an error. When a merge stops on conflicts the engine
//! hands a [`MergeConflict`] to the caller's [`ConflictResolver`] and waits.
//! Returning `true` means the conflicts are resolved in `work_dir` (either
//! left in the working tree or already committed); returning `false`
//! declines and rolls the whole operation back.

use std::path::PathBuf;

use super::error::EngineError;
use crate::core::transaction::merge_commit_message;
use crate::core::types::{BranchName, Oid};
use crate::git::{Git, MergeStatus};

/// A merge that stopped on conflicts.
#[derive(Debug, Clone)]
pub struct MergeConflict {
    /// Branch being merged in
    pub source: BranchName,
    /// Branch being merged into
    pub target: BranchName,
    /// Working tree holding the conflict markers
    pub work_dir: PathBuf,
    /// Conflicted paths, relative to `work_dir`
    pub paths: Vec<PathBuf>,
}

/// Decides whether a conflicted merge goes ahead.
pub trait ConflictResolver {
    /// Return `Ok(true)` once the conflicts in `conflict.work_dir` are
    /// resolved, `Ok(false)` to decline.
    fn resolve(&self, conflict: &MergeConflict) -> anyhow::Result<bool>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&MergeConflict) -> bool,
{
    fn resolve(&self, conflict: &MergeConflict) -> anyhow::Result<bool> {
        Ok(self(conflict))
    }
}

/// Declines every conflict. Used when nobody is around to resolve one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineConflicts;

impl ConflictResolver for DeclineConflicts {
    fn resolve(&self, conflict: &MergeConflict) -> anyhow::Result<bool> {
        tracing::warn!(
            source = %conflict.source,
            target = %conflict.target,
            paths = conflict.paths.len(),
            "declining merge conflict"
        );
        Ok(false)
    }
}

/// Merge `source_tip` (the tip of `source`) into the branch checked out in
/// `git`, which is `target`, handing any conflict to `resolver`.
///
/// Returns `Ok(false)` if the resolver declined. The repository is then
/// left mid-merge for the caller's rollback to clean up.
pub(crate) fn merge_resolving(
    git: &Git,
    source: &BranchName,
    target: &BranchName,
    source_tip: &Oid,
    resolver: &dyn ConflictResolver,
) -> Result<bool, EngineError> {
    let message = merge_commit_message(source.as_str(), target.as_str());
    let paths = match git.merge_into_head(source_tip, &message)? {
        MergeStatus::Conflicted(paths) => paths,
        status => {
            tracing::debug!(source = %source, target = %target, ?status, "merged");
            return Ok(true);
        }
    };

    let before = git.head_oid()?;
    let conflict = MergeConflict {
        source: source.clone(),
        target: target.clone(),
        work_dir: git.work_dir()?.to_path_buf(),
        paths,
    };
    tracing::info!(source = %source, target = %target, paths = conflict.paths.len(), "merge conflict");
    let accepted = resolver.resolve(&conflict)?;
    git.reload_index()?;
    if !accepted {
        return Ok(false);
    }

    // The resolver may already have committed the merge itself.
    if git.head_oid()? == before {
        git.commit_merge(&message, source_tip)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> MergeConflict {
        MergeConflict {
            source: BranchName::new("flexlate-templates").unwrap(),
            target: BranchName::new("flexlate-output").unwrap(),
            work_dir: PathBuf::from("/tmp/repo"),
            paths: vec![PathBuf::from("README.md")],
        }
    }

    #[test]
    fn closures_are_resolvers() {
        let accept = |_: &MergeConflict| true;
        assert!(accept.resolve(&conflict()).unwrap());
        let decline = |c: &MergeConflict| c.paths.is_empty();
        assert!(!decline.resolve(&conflict()).unwrap());
    }

    #[test]
    fn decline_conflicts_declines() {
        assert!(!DeclineConflicts.resolve(&conflict()).unwrap());
    }
}
