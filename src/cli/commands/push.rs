//! push command - Push flexlate branches to a remote

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::core::types::BranchName;
use crate::engine::{PushCoordinator, PushReport};
use crate::ui::output::{self, Verbosity};

/// Push the canonical template and merged branches.
pub fn push_main(ctx: &Context, remote: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let remote = remote.unwrap_or_else(|| session.config.remote());

    let report = PushCoordinator::new(&session.git)
        .push_main(
            remote,
            &session.config.template_branch()?,
            &session.config.merged_branch()?,
        )
        .with_context(|| format!("Failed to push to {remote}"))?;

    report_push(&report, remote, session.verbosity);
    Ok(())
}

/// Push the feature-scoped branches of `branch` (or the current branch).
pub fn push_feature(ctx: &Context, branch: Option<&str>, remote: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let remote = remote.unwrap_or_else(|| session.config.remote());
    let feature = match branch {
        Some(name) => BranchName::new(name)?,
        None => session.current_branch()?,
    };

    let report = PushCoordinator::new(&session.git)
        .push_feature(
            remote,
            &feature,
            &session.config.template_branch()?,
            &session.config.merged_branch()?,
        )
        .with_context(|| format!("Failed to push to {remote}"))?;

    report_push(&report, remote, session.verbosity);
    Ok(())
}

fn report_push(report: &PushReport, remote: &str, verbosity: Verbosity) {
    for branch in &report.skipped {
        output::warn(
            format!("{branch} does not exist locally; not pushed"),
            verbosity,
        );
    }
    if report.pushed.is_empty() {
        output::print("Nothing to push", verbosity);
    } else {
        output::success(
            format!(
                "Pushed to {remote}:\n{}",
                output::format_list(&report.pushed, "  ")
            ),
            verbosity,
        );
    }
}
