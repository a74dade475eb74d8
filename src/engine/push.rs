//! engine::push
//!
//! Pushes flexlate branches to a remote.

use super::error::EngineError;
use crate::core::types::BranchName;
use crate::git::Git;

/// Branches pushed and skipped by one push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub pushed: Vec<BranchName>,
    /// Branches that do not exist locally
    pub skipped: Vec<BranchName>,
}

/// Pushes branch sets to a remote.
pub struct PushCoordinator<'a> {
    git: &'a Git,
}

impl<'a> PushCoordinator<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Push the canonical template and merged branches.
    pub fn push_main(
        &self,
        remote: &str,
        template: &BranchName,
        merged: &BranchName,
    ) -> Result<PushReport, EngineError> {
        self.push(remote, &[template, merged])
    }

    /// Push the feature-scoped pair for `feature`.
    pub fn push_feature(
        &self,
        remote: &str,
        feature: &BranchName,
        template: &BranchName,
        merged: &BranchName,
    ) -> Result<PushReport, EngineError> {
        self.push(
            remote,
            &[&template.feature_scoped(feature), &merged.feature_scoped(feature)],
        )
    }

    /// Push each branch that exists locally, warning about the rest.
    pub fn push(&self, remote: &str, branches: &[&BranchName]) -> Result<PushReport, EngineError> {
        let span = tracing::info_span!("push", remote);
        let _enter = span.enter();

        let mut report = PushReport::default();
        for branch in branches {
            if self.git.branch_tip(branch)?.is_none() {
                tracing::warn!(branch = %branch, "cannot push branch that does not exist");
                report.skipped.push((*branch).clone());
                continue;
            }
            self.git.push_branch(remote, branch)?;
            tracing::info!(branch = %branch, remote, "pushed");
            report.pushed.push((*branch).clone());
        }
        Ok(report)
    }
}
