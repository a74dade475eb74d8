//! engine::snapshot
//!
//! Branch snapshots and rollback.
//!
//! Every mutating operation captures the tips of the branches it may touch
//! before doing anything risky. On decline or failure the snapshot is
//! restored, which leaves the repository sha-identical to before the call.
//!
//! # Restore Order
//!
//! 1. Abandon any merge left in progress
//! 2. Check the originally checked-out branch back out
//! 3. Point every other branch back at its recorded tip (or delete it if it
//!    did not exist), then hard-reset the checked-out branch
//!
//! Restoration is best effort: a branch that fails to restore is recorded
//! and the rest are still attempted. Callers turn an incomplete rollback
//! into [`EngineError::RollbackIncomplete`] with [`RollbackResult::check`]
//! or [`RollbackResult::escalate`].

use super::error::EngineError;
use crate::core::types::{BranchName, Fingerprint, Oid};
use crate::git::{Git, GitError};

/// Recorded tips of a set of branches plus the branch HEAD was on.
#[derive(Debug, Clone)]
pub struct BranchSnapshot {
    tips: Vec<(BranchName, Option<Oid>)>,
    head: Option<BranchName>,
}

impl BranchSnapshot {
    /// Record the current tips of `branches`. Missing branches are recorded
    /// as absent.
    pub fn capture(git: &Git, branches: &[&BranchName]) -> Result<Self, GitError> {
        let mut tips = Vec::with_capacity(branches.len());
        for branch in branches {
            if tips.iter().any(|(b, _)| b == *branch) {
                continue;
            }
            tips.push(((*branch).clone(), git.branch_tip(branch)?));
        }
        let head = git.current_branch()?;

        tracing::debug!(
            branches = tips.len(),
            head = head.as_ref().map(|b| b.as_str()).unwrap_or("<detached>"),
            "captured snapshot"
        );
        Ok(Self { tips, head })
    }

    /// The recorded tip of `branch`, if it was captured and existed.
    pub fn tip(&self, branch: &BranchName) -> Option<&Oid> {
        self.tips
            .iter()
            .find(|(b, _)| b == branch)
            .and_then(|(_, tip)| tip.as_ref())
    }

    /// Branch HEAD was on at capture time.
    pub fn head(&self) -> Option<&BranchName> {
        self.head.as_ref()
    }

    /// Fingerprint of the recorded tips.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.tips)
    }

    /// Fingerprint of the same branches as they are now.
    pub fn current_fingerprint(&self, git: &Git) -> Result<Fingerprint, GitError> {
        let now = self
            .tips
            .iter()
            .map(|(b, _)| Ok((b.clone(), git.branch_tip(b)?)))
            .collect::<Result<Vec<_>, GitError>>()?;
        Ok(Fingerprint::compute(&now))
    }

    /// Put every recorded branch back where it was.
    pub fn restore(&self, git: &Git) -> RollbackResult {
        let mut result = RollbackResult::new();

        if git.state().is_in_progress() {
            if let Err(e) = git.abort_merge() {
                result.record_failure("HEAD".to_string(), e);
            }
        }

        if let Some(head) = &self.head {
            match git.current_branch() {
                Ok(Some(current)) if current == *head => {}
                Ok(_) => {
                    let switched = git
                        .head_oid()
                        .and_then(|oid| git.reset_hard(&oid))
                        .and_then(|_| git.checkout_branch(head));
                    if let Err(e) = switched {
                        result.record_failure(head.to_string(), e);
                    }
                }
                Err(e) => result.record_failure("HEAD".to_string(), e),
            }
        }

        let current = git.current_branch().ok().flatten();
        for (branch, tip) in &self.tips {
            let restored = match (tip, current.as_ref()) {
                (Some(tip), Some(current)) if current == branch => git.reset_hard(tip),
                _ => git.force_branch(branch, tip.as_ref()),
            };
            match restored {
                Ok(()) => result.record_success(branch.to_string()),
                Err(e) => result.record_failure(branch.to_string(), e),
            }
        }

        if result.has_failures() {
            tracing::warn!(summary = %result.summary(), "rollback incomplete");
        } else {
            tracing::debug!(summary = %result.summary(), "rolled back");
        }
        result
    }
}

/// Result of a rollback attempt.
#[derive(Debug)]
pub struct RollbackResult {
    /// Branches that were restored.
    pub rolled_back: Vec<String>,
    /// Branches that could not be restored, with their errors.
    pub failed: Vec<(String, GitError)>,
    /// Whether everything was restored.
    pub complete: bool,
}

impl Default for RollbackResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackResult {
    pub fn new() -> Self {
        Self {
            rolled_back: vec![],
            failed: vec![],
            complete: true,
        }
    }

    pub fn record_success(&mut self, branch: String) {
        self.rolled_back.push(branch);
    }

    pub fn record_failure(&mut self, branch: String, error: GitError) {
        self.failed.push((branch, error));
        self.complete = false;
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// One-line description for logs and error output.
    pub fn summary(&self) -> String {
        if self.complete {
            format!("restored {} branch(es)", self.rolled_back.len())
        } else {
            let failed: Vec<_> = self.failed.iter().map(|(b, _)| b.as_str()).collect();
            format!(
                "partial rollback: {} restored, {} failed ({})",
                self.rolled_back.len(),
                self.failed.len(),
                failed.join(", ")
            )
        }
    }

    /// `Ok` when every branch was restored.
    pub fn check(self) -> Result<(), EngineError> {
        if self.complete {
            Ok(())
        } else {
            Err(EngineError::RollbackIncomplete {
                summary: self.summary(),
                cause: None,
            })
        }
    }

    /// The error to report for a rollback triggered by `cause`: `cause`
    /// itself when every branch was restored, otherwise
    /// [`EngineError::RollbackIncomplete`] wrapping it.
    pub fn escalate(self, cause: EngineError) -> EngineError {
        if self.complete {
            cause
        } else {
            EngineError::RollbackIncomplete {
                summary: self.summary(),
                cause: Some(Box::new(cause)),
            }
        }
    }
}
