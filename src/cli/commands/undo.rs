//! undo command - Revert the last flexlate operations

use anyhow::{Context as _, Result};

use super::Session;
use crate::cli::Context;
use crate::engine::UndoEngine;
use crate::ui::output;

/// Undo the last `count` flexlate operations on the current branch.
pub fn undo(ctx: &Context, count: usize) -> Result<()> {
    let session = Session::open(ctx)?;
    let active = session.current_branch()?;
    let names = session.branch_names(active)?;

    let report = UndoEngine::new(&session.git)
        .undo(count, &names)
        .context("Undo failed")?;

    output::success(
        format!("Undid {} flexlate operation(s)", report.undone.len()),
        session.verbosity,
    );
    let lines: Vec<String> = report.undone.iter().map(output::format_transaction).collect();
    output::print(output::format_list(&lines, "  "), session.verbosity);
    output::debug(
        [
            output::format_branch_move(&names.template, &report.template),
            output::format_branch_move(&names.merged, &report.merged),
            output::format_branch_move(&names.active, &report.active),
        ]
        .join(", "),
        session.verbosity,
    );
    Ok(())
}
