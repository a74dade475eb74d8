//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens the repository and loads configuration
//! 2. Resolves the branch names the operation works against
//! 3. Calls the engine with its collaborators
//! 4. Formats and displays output
//!
//! Handlers do NOT perform repository mutations directly.

mod merge;
mod push;
mod source;
mod undo;

pub use merge::merge;
pub use push::{push_feature, push_main};
pub use source::{add_source, remove_source};
pub use undo::undo;

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context as _, Result};

use super::args::{Command, PushTarget};
use super::Context;
use crate::core::config::Config;
use crate::core::naming::BranchNames;
use crate::core::types::BranchName;
use crate::engine::{ConflictResolver, MergeConflict};
use crate::git::Git;
use crate::ui::output::{self, Verbosity};
use crate::ui::prompts::{self, PromptError};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Undo { num_operations } => undo::undo(ctx, num_operations),
        Command::Merge { branch, no_delete } => merge::merge(ctx, branch.as_deref(), !no_delete),
        Command::Push { target } => match target {
            PushTarget::Main { remote } => push::push_main(ctx, remote.as_deref()),
            PushTarget::Feature { branch, remote } => {
                push::push_feature(ctx, branch.as_deref(), remote.as_deref())
            }
        },
        Command::AddSource {
            name,
            path,
            version,
            out_root,
        } => source::add_source(ctx, &name, &path, version.as_deref(), &out_root),
        Command::RemoveSource { name, out_root } => {
            source::remove_source(ctx, &name, &out_root)
        }
    }
}

/// An open repository with its configuration.
pub(crate) struct Session {
    pub git: Git,
    pub config: Config,
    pub verbosity: Verbosity,
    pub interactive: bool,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        let git = Git::open(&cwd).context("Failed to open repository")?;
        let config = Config::load(Some(git.work_dir()?))
            .context("Failed to load configuration")?
            .config;
        let verbosity = Verbosity::from_flags(ctx.quiet, ctx.debug);
        let interactive = ctx.interactive.unwrap_or_else(|| config.interactive());

        output::debug(
            format!("repository at {}", git.work_dir()?.display()),
            verbosity,
        );
        Ok(Self {
            git,
            config,
            verbosity,
            interactive,
        })
    }

    pub fn current_branch(&self) -> Result<BranchName> {
        match self.git.current_branch()? {
            Some(branch) => Ok(branch),
            None => bail!("HEAD is detached; check out a branch first"),
        }
    }

    /// The default branch: configured, else whatever the remote's HEAD names.
    pub fn default_branch(&self) -> Result<Option<BranchName>> {
        match self.config.default_branch() {
            Some(branch) => Ok(Some(branch)),
            None => Ok(self.git.remote_head_branch(self.config.remote())?),
        }
    }

    /// Branch names for an operation started on `active`.
    pub fn branch_names(&self, active: BranchName) -> Result<BranchNames> {
        let default = self.default_branch()?;
        Ok(BranchNames::resolve(
            self.config.template_branch()?,
            self.config.merged_branch()?,
            active,
            default.as_ref(),
        ))
    }

    pub fn resolver(&self) -> PromptResolver {
        PromptResolver {
            interactive: self.interactive,
            verbosity: self.verbosity,
        }
    }

    /// `out_root` (relative to the current directory) as a path relative to
    /// the repository root.
    pub fn repo_relative(&self, out_root: &Path) -> Result<PathBuf> {
        let work_dir = self.git.work_dir()?;
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        repo_relative(work_dir, &cwd, out_root)
    }
}

fn repo_relative(work_dir: &Path, cwd: &Path, out_root: &Path) -> Result<PathBuf> {
    let work_dir = work_dir.canonicalize().unwrap_or_else(|_| work_dir.to_path_buf());
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());

    let mut relative = PathBuf::new();
    let joined = cwd.join(out_root);
    let stripped = joined
        .strip_prefix(&work_dir)
        .with_context(|| format!("{} is outside the repository", joined.display()))?;
    for component in stripped.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    bail!("{} is outside the repository", out_root.display());
                }
            }
            Component::Normal(part) => relative.push(part),
            _ => bail!("unsupported path {}", out_root.display()),
        }
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Ok(relative)
}

/// Resolves conflicts by asking on the terminal.
///
/// Without a terminal every conflict is declined, which rolls the operation
/// back.
pub(crate) struct PromptResolver {
    interactive: bool,
    verbosity: Verbosity,
}

impl ConflictResolver for PromptResolver {
    fn resolve(&self, conflict: &MergeConflict) -> anyhow::Result<bool> {
        output::warn(
            format!(
                "merge conflicts while merging {} into {}:\n{}",
                conflict.source,
                conflict.target,
                output::format_list(
                    &conflict
                        .paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                    "  "
                )
            ),
            self.verbosity,
        );
        if !self.interactive {
            output::warn("not running interactively; aborting", self.verbosity);
            return Ok(false);
        }

        output::print(
            format!("Please resolve the conflicts in {}", conflict.work_dir.display()),
            self.verbosity,
        );
        match prompts::confirm("Conflicts resolved? n to abort", false, true) {
            Ok(answer) => Ok(answer),
            Err(PromptError::Cancelled) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod repo_relative {
        use super::*;

        #[test]
        fn root_is_dot() {
            let temp = TempDir::new().unwrap();
            let rel = repo_relative(temp.path(), temp.path(), Path::new(".")).unwrap();
            assert_eq!(rel, PathBuf::from("."));
        }

        #[test]
        fn nested_from_subdirectory() {
            let temp = TempDir::new().unwrap();
            let sub = temp.path().join("sub");
            std::fs::create_dir_all(&sub).unwrap();
            let rel = repo_relative(temp.path(), &sub, Path::new("out")).unwrap();
            assert_eq!(rel, PathBuf::from("sub/out"));
            let rel = repo_relative(temp.path(), &sub, Path::new("..")).unwrap();
            assert_eq!(rel, PathBuf::from("."));
        }

        #[test]
        fn escaping_is_rejected() {
            let temp = TempDir::new().unwrap();
            assert!(repo_relative(temp.path(), temp.path(), Path::new("../x")).is_err());
        }
    }
}
