//! merge command - Fold feature-scoped flexlate branches into the main ones

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::BranchName;
use crate::engine::{MergeCoordinator, MergeOutcome, MergeRequest};
use crate::ui::output;

/// Merge the flexlate branches of `branch` (or the current branch).
pub fn merge(ctx: &Context, branch: Option<&str>, delete: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let feature = match branch {
        Some(name) => BranchName::new(name)?,
        None => session.current_branch()?,
    };

    let request = MergeRequest {
        feature,
        base_template: session.config.template_branch()?,
        base_merged: session.config.merged_branch()?,
        delete,
    };
    let resolver = session.resolver();

    let outcome = MergeCoordinator::new(&session.git, &resolver)
        .merge(&request)
        .with_context(|| format!("Failed to merge flexlate branches of {}", request.feature))?;

    match outcome {
        MergeOutcome::Merged { deleted, .. } => {
            output::success(
                format!(
                    "Merged {} into {} and {} into {}",
                    request.feature_template(),
                    request.base_template,
                    request.feature_merged(),
                    request.base_merged
                ),
                session.verbosity,
            );
            if !deleted.is_empty() {
                output::print(
                    format!("Deleted:\n{}", output::format_list(&deleted, "  ")),
                    session.verbosity,
                );
            }
        }
        MergeOutcome::Declined => {
            output::warn("merge aborted; branches restored", session.verbosity);
        }
    }
    Ok(())
}
