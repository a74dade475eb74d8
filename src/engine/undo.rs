//! engine::undo
//!
//! Reverses the last N transactions on the template, merged and active
//! branches together.
//!
//! # Plan, then publish
//!
//! Every iteration is planned against the object graph alone: resolve the
//! transaction at each tip, check the three branches agree, compute each
//! branch's anchor and prove the corridor from anchor to tip holds only
//! flexlate commits. Nothing moves until all N iterations validate. Then
//! the template and merged branches are CAS-updated and the checked-out
//! active branch is hard-reset. A publication failure restores the
//! snapshot taken before planning.
//!
//! # Anchors
//!
//! - Template branch: the parent of the transaction's boundary commit, or
//!   the boundary itself when it is a root
//! - Merged and active branches: the branch-side parent of the earliest
//!   merge that brought the transaction in, falling back to the template
//!   rule when the transaction arrived by fast-forward

use super::error::EngineError;
use super::gate::{gate, requirements};
use super::log::{MergePair, TransactionLog};
use super::snapshot::BranchSnapshot;
use crate::core::naming::BranchNames;
use crate::core::transaction::Transaction;
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::{Git, GitError};

/// What an undo did.
#[derive(Debug, Clone)]
pub struct UndoReport {
    /// Undone transactions, most recent first
    pub undone: Vec<Transaction>,
    /// New template branch tip
    pub template: Oid,
    /// New merged branch tip
    pub merged: Oid,
    /// New active branch tip
    pub active: Oid,
}

#[derive(Debug, Clone)]
struct Tips {
    template: Oid,
    merged: Oid,
    active: Oid,
}

/// Reverts flexlate transactions.
pub struct UndoEngine<'a> {
    git: &'a Git,
}

impl<'a> UndoEngine<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Undo the last `count` transactions.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidCount`] if `count` is zero
    /// - [`EngineError::LastCommitWasNotByFlexlate`] if a tip is foreign
    /// - [`EngineError::TooFewTransactions`] if history runs out first
    /// - [`EngineError::TransactionMismatch`] if the branches disagree
    /// - [`EngineError::UnsafeUndo`] if a foreign commit would be discarded
    ///
    /// None of these move any ref. If publishing fails part way, the
    /// snapshot is restored; a restore that cannot put every branch back
    /// surfaces as [`EngineError::RollbackIncomplete`].
    ///
    /// Only `names.template`, `names.merged` and `names.active` are read
    /// and moved. On a feature branch those are the feature-scoped pair, so
    /// the canonical `base_template` and `base_merged` branches are never
    /// touched: transactions already folded into them by a merge are
    /// undone by undoing on the branch that holds them.
    pub fn undo(&self, count: usize, names: &BranchNames) -> Result<UndoReport, EngineError> {
        let span = tracing::info_span!("undo", count, branch = %names.active);
        let _enter = span.enter();

        if count == 0 {
            return Err(EngineError::InvalidCount);
        }
        gate(self.git, names, &requirements::MUTATING)?;

        let snapshot =
            BranchSnapshot::capture(self.git, &[&names.template, &names.merged, &names.active])?;
        let start = Tips {
            template: required_tip(&snapshot, &names.template)?,
            merged: required_tip(&snapshot, &names.merged)?,
            active: self.git.head_oid()?,
        };

        let log = TransactionLog::new(vec![
            MergePair::new(names.template.clone(), names.merged.clone()),
            MergePair::new(names.merged.clone(), names.active.clone()),
        ]);

        let mut tips = start.clone();
        let mut undone = Vec::with_capacity(count);
        for i in 0..count {
            let tx = match log.try_resolve(self.git, &tips.active)? {
                Some(tx) => tx,
                None if i == 0 => {
                    return Err(EngineError::LastCommitWasNotByFlexlate {
                        branch: names.active.to_string(),
                        oid: tips.active.to_string(),
                    })
                }
                None => {
                    tracing::debug!(found = i, "history exhausted");
                    return Err(EngineError::TooFewTransactions {
                        requested: count,
                        found: i,
                    });
                }
            };
            tracing::debug!(tx = %tx.id(), kind = %tx.kind(), "planning undo");

            self.check_branch_tx(&log, &names.template, &tips.template, &tx)?;
            self.check_branch_tx(&log, &names.merged, &tips.merged, &tx)?;

            let next = Tips {
                template: self.template_anchor(&log, &tips.template, &tx)?,
                merged: self.merged_anchor(&log, &tips.merged, &tx)?,
                active: self.merged_anchor(&log, &tips.active, &tx)?,
            };
            log.verify_corridor_safe(self.git, &next.template, &tips.template)?;
            log.verify_corridor_safe(self.git, &next.merged, &tips.merged)?;
            log.verify_corridor_safe(self.git, &next.active, &tips.active)?;

            tips = next;
            undone.push(tx);
        }

        if snapshot.current_fingerprint(self.git)? != snapshot.fingerprint() {
            tracing::warn!("branches moved while planning undo");
            return Err(EngineError::BranchesMoved);
        }
        if let Err(err) = self.publish(names, &start, &tips) {
            tracing::warn!(%err, "undo publication failed, rolling back");
            return Err(snapshot.restore(self.git).escalate(err));
        }

        tracing::info!(undone = undone.len(), "undo complete");
        Ok(UndoReport {
            undone,
            template: tips.template,
            merged: tips.merged,
            active: tips.active,
        })
    }

    /// The tip of `branch` must carry `expected`.
    fn check_branch_tx(
        &self,
        log: &TransactionLog,
        branch: &BranchName,
        tip: &Oid,
        expected: &Transaction,
    ) -> Result<(), EngineError> {
        match log.try_resolve(self.git, tip)? {
            Some(found) if found.id() == expected.id() => Ok(()),
            Some(found) => Err(EngineError::TransactionMismatch {
                branch: branch.to_string(),
                expected: expected.id(),
                found: found.id(),
            }),
            None => Err(EngineError::LastCommitWasNotByFlexlate {
                branch: branch.to_string(),
                oid: tip.to_string(),
            }),
        }
    }

    fn template_anchor(
        &self,
        log: &TransactionLog,
        tip: &Oid,
        tx: &Transaction,
    ) -> Result<Oid, EngineError> {
        let boundary = log.find_boundary(self.git, tip, tx)?;
        let record = log.record(self.git, &boundary)?;
        Ok(record.parents.first().cloned().unwrap_or(boundary))
    }

    fn merged_anchor(
        &self,
        log: &TransactionLog,
        tip: &Oid,
        tx: &Transaction,
    ) -> Result<Oid, EngineError> {
        match log.find_earliest_merge_for(self.git, tip, tx)? {
            Some(merge) => Ok(log.merge_parents(self.git, &merge)?.other_parent),
            None => self.template_anchor(log, tip, tx),
        }
    }

    fn publish(&self, names: &BranchNames, from: &Tips, to: &Tips) -> Result<(), EngineError> {
        let git = self.git;
        git.update_ref_cas(
            RefName::for_branch(&names.template).as_str(),
            &to.template,
            Some(&from.template),
            "flexlate: undo",
        )?;
        git.update_ref_cas(
            RefName::for_branch(&names.merged).as_str(),
            &to.merged,
            Some(&from.merged),
            "flexlate: undo",
        )?;

        let head = git.head_oid()?;
        if git.current_branch()?.as_ref() != Some(&names.active) || head != from.active {
            return Err(GitError::CasFailed {
                refname: RefName::for_branch(&names.active).to_string(),
                expected: from.active.to_string(),
                actual: head.to_string(),
            }
            .into());
        }
        git.reset_hard(&to.active)?;
        Ok(())
    }
}

fn required_tip(snapshot: &BranchSnapshot, branch: &BranchName) -> Result<Oid, EngineError> {
    snapshot
        .tip(branch)
        .cloned()
        .ok_or_else(|| EngineError::MissingBranch {
            branch: branch.to_string(),
        })
}
