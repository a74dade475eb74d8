//! ui::output
//!
//! User-facing output.
//!
//! # Design
//!
//! Progress and results go to stdout, problems to stderr. Everything except
//! errors respects the quiet flag. Internal diagnostics are `tracing`
//! events, not output.

use std::fmt::Display;

use crate::core::transaction::Transaction;
use crate::core::types::{BranchName, Oid};

/// How much the commands say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    Normal,
    /// Normal output plus `[debug]` lines
    Debug,
}

impl Verbosity {
    /// Quiet wins over debug.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        match (quiet, debug) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Debug,
            (false, false) => Verbosity::Normal,
        }
    }

    fn shows_progress(self) -> bool {
        self != Verbosity::Quiet
    }
}

/// Print a line to stdout unless quiet.
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity.shows_progress() {
        println!("{message}");
    }
}

/// Print a `[debug]` line to stderr in debug mode.
pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {message}");
    }
}

/// Print an error to stderr. Always shown.
pub fn error(message: impl Display) {
    eprintln!("error: {message}");
}

/// Print a warning to stderr unless quiet.
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity.shows_progress() {
        eprintln!("warning: {message}");
    }
}

/// Report a finished operation.
pub fn success(message: impl Display, verbosity: Verbosity) {
    print(message, verbosity);
}

/// One line per item, each behind `prefix`.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{prefix}{item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `add source demo (5f0c...)`, or without the target when there is none.
pub fn format_transaction(tx: &Transaction) -> String {
    match tx.target() {
        Some(target) => format!("{} {} ({})", tx.kind(), target, tx.id()),
        None => format!("{} ({})", tx.kind(), tx.id()),
    }
}

/// `branch -> abc1234`
pub fn format_branch_move(branch: &BranchName, to: &Oid) -> String {
    format!("{branch} -> {}", to.short(7))
}
