//! Flexlate - keep generated projects in sync with their templates
//!
//! Flexlate records every template operation as a commit on a dedicated
//! template branch, merges that branch into an output branch, and merges the
//! output branch into the user's branch. Git history is the transaction log:
//! undo walks it back, and feature branches get their own scoped pair of
//! flexlate branches that are folded back in with a merge.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Orchestrates Gate → Snapshot → Mutate → Publish → Rollback
//! - [`core`] - Domain types, transaction envelope, branch naming, configuration
//! - [`git`] - Single interface for all Git operations
//! - [`project`] - Project configuration files and the built-in mutations
//! - [`telemetry`] - Tracing subscriber setup
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! 1. Every commit flexlate makes carries a parseable transaction envelope
//! 2. Branch refs move only by compare-and-swap against a captured snapshot
//! 3. A failed or declined operation leaves every branch where it started
//! 4. Undo never discards a commit flexlate did not make

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod project;
pub mod telemetry;
pub mod ui;
