//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. All repository reads and
//! writes flow through [`Git`]. No other module imports `git2`.
//!
//! Local operations go through libgit2. Pushing to a remote shells out to
//! the `git` binary so the user's credential helpers apply.
//!
//! # Invariants
//!
//! - Branches that are not checked out move only by CAS ref updates
//! - All operations return strong types (Oid, BranchName, RefName)
//! - Isolated mutations happen in an [`EphemeralClone`] and come back by
//!   fetch
//!
//! # Example
//!
//! ```ignore
//! use flexlate::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let tip = git.resolve_ref("refs/heads/flexlate-templates")?;
//! git.update_ref_cas(
//!     "refs/heads/flexlate-templates",
//!     &new_tip,
//!     Some(&tip),
//!     "flexlate: publish",
//! )?;
//! ```

mod ephemeral;
mod interface;

pub use ephemeral::EphemeralClone;
pub use interface::{CommitInfo, Git, GitError, GitState, MergeStatus, WorktreeStatus};
