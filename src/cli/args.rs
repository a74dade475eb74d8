//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--no-interactive`: Never prompt; conflicts decline and roll back
//! - `--quiet` / `-q`: Minimal output

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// fxt - keep generated projects in sync with their templates
#[derive(Parser, Debug)]
#[command(name = "fxt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if fxt was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Whether prompts may be shown, before configuration is consulted.
    ///
    /// Returns `Some(false)` when `--no-interactive` or `--quiet` is set or
    /// stdin is not a terminal, `None` when the configuration decides.
    pub fn interactive_override(&self) -> Option<bool> {
        if self.no_interactive || self.quiet || !std::io::stdin().is_terminal() {
            Some(false)
        } else {
            None
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Undo the last flexlate operations
    #[command(
        name = "undo",
        long_about = "Undo the last N flexlate operations.\n\n\
            Resets the template branch, the merged branch and the current branch to \
            where they were before each operation. Refuses if any commit that would \
            be discarded was not made by flexlate.",
        after_help = "\
EXAMPLES:
    # Undo the most recent operation
    fxt undo

    # Undo the last three operations
    fxt undo 3"
    )]
    Undo {
        /// Number of operations to undo
        #[arg(default_value_t = 1)]
        num_operations: usize,
    },

    /// Merge feature-branch flexlate branches into the main ones
    #[command(
        name = "merge",
        long_about = "Merge the flexlate branches of a feature branch into the main flexlate branches.\n\n\
            Work done on a feature branch records its template history on \
            feature-scoped flexlate branches. Run this once the feature branch itself \
            has been merged."
    )]
    Merge {
        /// Feature branch whose flexlate branches to merge (defaults to current)
        #[arg(long)]
        branch: Option<String>,

        /// Keep the feature-scoped flexlate branches afterwards
        #[arg(long)]
        no_delete: bool,
    },

    /// Push flexlate branches to a remote
    Push {
        #[command(subcommand)]
        target: PushTarget,
    },

    /// Add a template source to the project
    #[command(name = "add-source")]
    AddSource {
        /// Name to refer to the template by
        name: String,

        /// Local path or URL of the template
        path: String,

        /// Template version to pin
        #[arg(long)]
        version: Option<String>,

        /// Directory holding the flexlate.json to edit
        #[arg(long, default_value = ".")]
        out_root: PathBuf,
    },

    /// Remove a template source from the project
    #[command(name = "remove-source")]
    RemoveSource {
        /// Name of the template source
        name: String,

        /// Directory holding the flexlate.json to edit
        #[arg(long, default_value = ".")]
        out_root: PathBuf,
    },
}

/// Which branch pair to push.
#[derive(Subcommand, Debug)]
pub enum PushTarget {
    /// Push the main flexlate branches
    Main {
        /// Remote to push to (defaults to the configured remote)
        #[arg(long)]
        remote: Option<String>,
    },

    /// Push the flexlate branches of a feature branch
    Feature {
        /// Feature branch (defaults to current)
        #[arg(long)]
        branch: Option<String>,

        /// Remote to push to (defaults to the configured remote)
        #[arg(long)]
        remote: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn undo_defaults_to_one() {
        let cli = Cli::try_parse_from(["fxt", "undo"]).unwrap();
        assert!(matches!(cli.command, Command::Undo { num_operations: 1 }));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fxt", "undo", "2", "--no-interactive", "--quiet"]).unwrap();
        assert!(cli.no_interactive);
        assert!(cli.quiet);
        assert_eq!(cli.interactive_override(), Some(false));
    }

    #[test]
    fn push_feature_options() {
        let cli = Cli::try_parse_from([
            "fxt", "push", "feature", "--branch", "feat", "--remote", "upstream",
        ])
        .unwrap();
        match cli.command {
            Command::Push {
                target: PushTarget::Feature { branch, remote },
            } => {
                assert_eq!(branch.as_deref(), Some("feat"));
                assert_eq!(remote.as_deref(), Some("upstream"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_source_arguments() {
        let cli = Cli::try_parse_from([
            "fxt",
            "add-source",
            "demo",
            "/tpl/demo",
            "--version",
            "v1",
        ])
        .unwrap();
        match cli.command {
            Command::AddSource {
                name,
                path,
                version,
                out_root,
            } => {
                assert_eq!(name, "demo");
                assert_eq!(path, "/tpl/demo");
                assert_eq!(version.as_deref(), Some("v1"));
                assert_eq!(out_root, PathBuf::from("."));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
