//! add-source / remove-source commands
//!
//! Both edit `flexlate.json` through the branch synchronizer so the change
//! lands on the template branch first and reaches the current branch by
//! merge.

use std::path::Path;

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::engine::{ApplyOutcome, ApplyRequest, BranchSynchronizer, Mutation};
use crate::project::{AddTemplateSource, FileConfigStore, RemoveTemplateSource, TemplateSource};
use crate::ui::output;

/// Add a template source to the `flexlate.json` under `out_root`.
pub fn add_source(
    ctx: &Context,
    name: &str,
    path: &str,
    version: Option<&str>,
    out_root: &Path,
) -> Result<()> {
    let session = Session::open(ctx)?;
    let out_root = session.repo_relative(out_root)?;

    let mut source = TemplateSource::new(name, path);
    if let Some(version) = version {
        source = source.with_version(version);
    }
    let mutation = AddTemplateSource::new(source, out_root.clone());
    let request = ApplyRequest::new(
        mutation.transaction(),
        mutation.commit_message(),
        session.branch_names(session.current_branch()?)?,
    )
    .with_out_root(&out_root);

    run(&session, &mutation, &request)
        .with_context(|| format!("Failed to add template source {name}"))?;
    Ok(())
}

/// Remove a template source from the `flexlate.json` under `out_root`.
pub fn remove_source(ctx: &Context, name: &str, out_root: &Path) -> Result<()> {
    let session = Session::open(ctx)?;
    let out_root = session.repo_relative(out_root)?;

    let mutation = RemoveTemplateSource::new(name, out_root.clone());
    let request = ApplyRequest::new(
        mutation.transaction(),
        mutation.commit_message(),
        session.branch_names(session.current_branch()?)?,
    )
    .with_out_root(&out_root);

    run(&session, &mutation, &request)
        .with_context(|| format!("Failed to remove template source {name}"))?;
    Ok(())
}

fn run(session: &Session, mutation: &dyn Mutation, request: &ApplyRequest) -> Result<()> {
    let resolver = session.resolver();
    let outcome =
        BranchSynchronizer::new(&session.git, &FileConfigStore, &resolver).apply(mutation, request)?;

    match outcome {
        ApplyOutcome::Applied { active, .. } => output::success(
            format!("{} ({})", request.message, active.short(7)),
            session.verbosity,
        ),
        ApplyOutcome::Declined => {
            output::warn("operation aborted; branches restored", session.verbosity)
        }
    }
    Ok(())
}
