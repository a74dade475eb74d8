//! ui
//!
//! Terminal output and prompts for the `fxt` commands.
//!
//! - [`output`] - progress, results, warnings and errors, gated by verbosity
//! - [`prompts`] - yes/no confirmation, used when a merge stops on conflicts
//!
//! Non-interactive runs never block on a prompt: conflicts are declined and
//! the operation rolls back.

pub mod output;
pub mod prompts;
