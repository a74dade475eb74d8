//! engine::merge
//!
//! Folds a feature-scoped branch pair back into the canonical pair.
//!
//! Work done on a feature branch records its template history on
//! `<template>-<feature>` and `<merged>-<feature>`. Once the feature lands,
//! [`MergeCoordinator`] brings those into the canonical branches:
//!
//! - Template branch first: fast-forward if possible, otherwise merge in a
//!   temporary clone and publish with a CAS update
//! - Merged branch second: fast-forward if possible, otherwise check it out
//!   in the real repository, merge the (already reconciled) canonical
//!   template branch in, then the feature merged branch
//!
//! Declining a conflict restores every branch to where it was. A rollback
//! that cannot restore some branch is reported as
//! [`EngineError::RollbackIncomplete`].

use super::conflict::{merge_resolving, ConflictResolver};
use super::error::EngineError;
use super::gate::{gate, requirements};
use super::snapshot::BranchSnapshot;
use crate::core::naming::BranchNames;
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::{EphemeralClone, Git};

/// Which feature pair to fold into which canonical pair.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// The feature branch whose flexlate branches are merged
    pub feature: BranchName,
    /// Canonical template branch
    pub base_template: BranchName,
    /// Canonical merged branch
    pub base_merged: BranchName,
    /// Delete the feature-scoped branches afterwards
    pub delete: bool,
}

impl MergeRequest {
    pub fn feature_template(&self) -> BranchName {
        self.base_template.feature_scoped(&self.feature)
    }

    pub fn feature_merged(&self) -> BranchName {
        self.base_merged.feature_scoped(&self.feature)
    }
}

/// How a merge ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both canonical branches now contain the feature branches.
    Merged {
        template: Oid,
        merged: Oid,
        deleted: Vec<BranchName>,
    },
    /// A conflict was declined and everything was rolled back.
    Declined,
}

/// Reconciles feature-scoped flexlate branches.
pub struct MergeCoordinator<'a> {
    git: &'a Git,
    resolver: &'a dyn ConflictResolver,
}

impl<'a> MergeCoordinator<'a> {
    pub fn new(git: &'a Git, resolver: &'a dyn ConflictResolver) -> Self {
        Self { git, resolver }
    }

    /// Merge the feature pair named by `request` into the canonical pair.
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome, EngineError> {
        let span = tracing::info_span!("merge", feature = %request.feature);
        let _enter = span.enter();

        let git = self.git;
        let current = git.current_branch()?.ok_or(EngineError::DetachedHead)?;
        let names = BranchNames {
            active: current.clone(),
            merged: request.feature_merged(),
            template: request.feature_template(),
            base_merged: request.base_merged.clone(),
            base_template: request.base_template.clone(),
        };
        gate(git, &names, &requirements::MUTATING)?;

        let snapshot = BranchSnapshot::capture(
            git,
            &[
                &names.base_template,
                &names.base_merged,
                &names.template,
                &names.merged,
                &current,
            ],
        )?;

        match self.run(&names, request.delete, &snapshot) {
            Ok(MergeOutcome::Declined) => {
                tracing::info!("conflict declined, rolling back");
                snapshot
                    .restore(git)
                    .check()
                    .map(|()| MergeOutcome::Declined)
            }
            Ok(merged) => Ok(merged),
            Err(err) => {
                tracing::warn!(%err, "merge failed, rolling back");
                Err(snapshot.restore(git).escalate(err))
            }
        }
    }

    fn run(
        &self,
        names: &BranchNames,
        delete: bool,
        snapshot: &BranchSnapshot,
    ) -> Result<MergeOutcome, EngineError> {
        let git = self.git;
        let feature_template = required(snapshot, &names.template)?;
        let feature_merged = required(snapshot, &names.merged)?;

        let canonical = snapshot.tip(&names.base_template);
        if !self.fast_forward(&names.base_template, canonical, &feature_template)?
            && !self.merge_template_in_clone(names, canonical, &feature_template)?
        {
            return Ok(MergeOutcome::Declined);
        }
        let template = required_now(git, &names.base_template)?;
        tracing::info!(from = %names.template, into = %names.base_template, oid = %template, "merged");

        let canonical = snapshot.tip(&names.base_merged);
        if !self.fast_forward(&names.base_merged, canonical, &feature_merged)? {
            git.checkout_branch(&names.base_merged)?;
            // Template first, so conflicts it already resolved do not come
            // back through the feature merged branch.
            if !merge_resolving(
                git,
                &names.base_template,
                &names.base_merged,
                &template,
                self.resolver,
            )? {
                return Ok(MergeOutcome::Declined);
            }
            if !merge_resolving(
                git,
                &names.merged,
                &names.base_merged,
                &feature_merged,
                self.resolver,
            )? {
                return Ok(MergeOutcome::Declined);
            }
            git.checkout_branch(&names.active)?;
        }
        let merged = required_now(git, &names.base_merged)?;
        tracing::info!(from = %names.merged, into = %names.base_merged, oid = %merged, "merged");

        let mut deleted = Vec::new();
        if delete {
            for (branch, tip) in [
                (&names.template, &feature_template),
                (&names.merged, &feature_merged),
            ] {
                git.delete_branch(branch, tip)?;
                deleted.push(branch.clone());
            }
            tracing::debug!(count = deleted.len(), "deleted feature branches");
        }

        Ok(MergeOutcome::Merged {
            template,
            merged,
            deleted,
        })
    }

    /// Move `branch` to `to` if that is a fast-forward. Returns false when
    /// the branches have diverged.
    fn fast_forward(
        &self,
        branch: &BranchName,
        current: Option<&Oid>,
        to: &Oid,
    ) -> Result<bool, EngineError> {
        let git = self.git;
        match current {
            None => git.create_branch(branch, to)?,
            Some(current) if current == to => {}
            Some(current) if git.is_ancestor(current, to)? => {
                git.update_ref_cas(
                    RefName::for_branch(branch).as_str(),
                    to,
                    Some(current),
                    "flexlate: fast-forward",
                )?;
            }
            Some(current) if git.is_ancestor(to, current)? => {}
            Some(_) => return Ok(false),
        }
        Ok(true)
    }

    fn merge_template_in_clone(
        &self,
        names: &BranchNames,
        canonical: Option<&Oid>,
        feature_tip: &Oid,
    ) -> Result<bool, EngineError> {
        let git = self.git;
        let canonical = canonical.ok_or_else(|| EngineError::MissingBranch {
            branch: names.base_template.to_string(),
        })?;

        let clone = EphemeralClone::of(git)?;
        clone.checkout_at(&names.base_template, canonical)?;
        if !merge_resolving(
            clone.git(),
            &names.template,
            &names.base_template,
            feature_tip,
            self.resolver,
        )? {
            return Ok(false);
        }

        let tip = git.fetch_branch_from(clone.path()?, &names.base_template)?;
        git.update_ref_cas(
            RefName::for_branch(&names.base_template).as_str(),
            &tip,
            Some(canonical),
            "flexlate: merge",
        )?;
        Ok(true)
    }
}

fn required(snapshot: &BranchSnapshot, branch: &BranchName) -> Result<Oid, EngineError> {
    snapshot
        .tip(branch)
        .cloned()
        .ok_or_else(|| EngineError::MissingBranch {
            branch: branch.to_string(),
        })
}

fn required_now(git: &Git, branch: &BranchName) -> Result<Oid, EngineError> {
    git.branch_tip(branch)?
        .ok_or_else(|| EngineError::MissingBranch {
            branch: branch.to_string(),
        })
}
