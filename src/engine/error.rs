//! engine::error
//!
//! The protocol error type.
//!
//! Every failure the engine can surface is an [`EngineError`]. Callers that
//! need to react by kind rather than by variant use
//! [`EngineError::category`].
//!
//! # Categories
//!
//! | Category      | Raised                                   | Refs touched? |
//! |---------------|------------------------------------------|---------------|
//! | Precondition  | before anything runs                     | no            |
//! | Parse         | a commit lacks a readable envelope       | no            |
//! | Consistency   | history contradicts itself               | no            |
//! | Safety        | undo would destroy foreign commits       | no            |
//! | Substrate     | git itself failed                        | rolled back   |
//! | Collaborator  | renderer, config store or prompt failed  | rolled back   |

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::core::transaction::TransactionError;
use crate::git::{GitError, GitState};

/// Broad kind of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Precondition,
    Parse,
    Consistency,
    Safety,
    Substrate,
    Collaborator,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Consistency => "consistency",
            ErrorCategory::Safety => "safety",
            ErrorCategory::Substrate => "git",
            ErrorCategory::Collaborator => "collaborator",
        };
        f.write_str(name)
    }
}

/// Errors from the transaction protocol.
#[derive(Debug, Error)]
pub enum EngineError {
    // ---------------------------------------------------------------------
    // Precondition
    // ---------------------------------------------------------------------
    /// Working tree has changes, including untracked files.
    #[error("git working tree is not clean ({details}); commit, stash or discard changes first")]
    DirtyWorkingTree {
        /// What is dirty
        details: String,
    },

    /// HEAD is unborn.
    #[error("repository has no commits; make an initial commit first")]
    NoCommits,

    /// HEAD is detached.
    #[error("HEAD is detached; check out a branch first")]
    DetachedHead,

    /// A merge, rebase or similar is already in progress.
    #[error("a {operation} is in progress; finish or abort it first")]
    OperationInProgress {
        /// What is in progress
        operation: GitState,
    },

    /// The caller is sitting on a flexlate-managed branch.
    #[error("'{branch}' is managed by flexlate; check out one of your own branches first")]
    OnFlexlateBranch {
        /// The checked-out branch
        branch: String,
    },

    /// The checked-out branch is not the one the operation was planned for.
    #[error("expected '{expected}' to be checked out, found '{actual}'")]
    NotOnActiveBranch {
        /// Branch the operation was planned for
        expected: String,
        /// Branch actually checked out
        actual: String,
    },

    /// A branch the operation needs does not exist.
    #[error("branch '{branch}' does not exist")]
    MissingBranch {
        /// The missing branch
        branch: String,
    },

    /// Undo was asked to revert zero transactions.
    #[error("number of transactions to undo must be at least 1")]
    InvalidCount,

    /// The mutation left the template branch unchanged.
    #[error("the operation made no changes")]
    NoChanges,

    /// Branches moved between planning and publishing.
    #[error("branches changed while the operation was running; nothing was changed, try again")]
    BranchesMoved,

    // ---------------------------------------------------------------------
    // Parse
    // ---------------------------------------------------------------------
    /// A commit message lacks a readable transaction envelope.
    #[error(transparent)]
    Parse(#[from] TransactionError),

    // ---------------------------------------------------------------------
    // Consistency
    // ---------------------------------------------------------------------
    /// Branches disagree about which transaction is last.
    #[error("branch '{branch}' ends with transaction {found}, expected {expected}")]
    TransactionMismatch {
        /// Branch whose tip disagreed
        branch: String,
        /// Transaction on the reference branch
        expected: Uuid,
        /// Transaction found on `branch`
        found: Uuid,
    },

    /// A commit was expected to be a flexlate merge commit.
    #[error("commit {oid} is not a flexlate merge commit")]
    ExpectedMergeCommit {
        /// The commit
        oid: String,
    },

    /// Neither parent of a flexlate merge commit carries a transaction.
    #[error("cannot find the transaction parent of merge commit {oid}")]
    CannotFindMergeParent {
        /// The merge commit
        oid: String,
    },

    /// A commit with a flexlate merge message does not have two parents.
    #[error("merge commit {oid} has {count} parent(s), expected 2")]
    WrongParentCount {
        /// The commit
        oid: String,
        /// How many parents it has
        count: usize,
    },

    /// A walk started from a commit that is not part of the transaction.
    #[error("commit {oid} is not part of transaction {tx}")]
    NotInTransaction {
        /// Where the walk started
        oid: String,
        /// The transaction looked for
        tx: Uuid,
    },

    // ---------------------------------------------------------------------
    // Safety
    // ---------------------------------------------------------------------
    /// History ran out before the requested number of transactions.
    #[error("cannot undo {requested} transaction(s): only {found} can be undone")]
    TooFewTransactions {
        /// Transactions asked for
        requested: usize,
        /// Transactions available
        found: usize,
    },

    /// The tip of a branch was not written by flexlate.
    #[error("last commit {oid} on '{branch}' was not made by flexlate; refusing to undo")]
    LastCommitWasNotByFlexlate {
        /// The branch
        branch: String,
        /// Its tip
        oid: String,
    },

    /// A foreign commit sits in the range an undo would discard.
    #[error("undo would discard commit {oid} ({summary}) which was not made by flexlate")]
    UnsafeUndo {
        /// The foreign commit
        oid: String,
        /// Its summary line
        summary: String,
    },

    // ---------------------------------------------------------------------
    // Substrate
    // ---------------------------------------------------------------------
    /// Git failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Filesystem failure outside git.
    #[error("{}: {source}", path.display())]
    Io {
        /// The path being touched
        path: PathBuf,
        /// The error
        source: std::io::Error,
    },

    /// Rolling back after a decline or failure left some branches moved.
    #[error("rollback incomplete, repository may be left modified: {summary}")]
    RollbackIncomplete {
        /// Which branches were and were not restored
        summary: String,
        /// The failure that triggered the rollback; absent after a decline
        #[source]
        cause: Option<Box<EngineError>>,
    },

    // ---------------------------------------------------------------------
    // Collaborator
    // ---------------------------------------------------------------------
    /// A renderer, config store, mutation or conflict resolver failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl EngineError {
    /// The broad kind of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::DirtyWorkingTree { .. }
            | EngineError::NoCommits
            | EngineError::DetachedHead
            | EngineError::OperationInProgress { .. }
            | EngineError::OnFlexlateBranch { .. }
            | EngineError::NotOnActiveBranch { .. }
            | EngineError::MissingBranch { .. }
            | EngineError::InvalidCount
            | EngineError::NoChanges
            | EngineError::BranchesMoved => ErrorCategory::Precondition,
            EngineError::Parse(_) => ErrorCategory::Parse,
            EngineError::TransactionMismatch { .. }
            | EngineError::ExpectedMergeCommit { .. }
            | EngineError::CannotFindMergeParent { .. }
            | EngineError::WrongParentCount { .. }
            | EngineError::NotInTransaction { .. } => ErrorCategory::Consistency,
            EngineError::TooFewTransactions { .. }
            | EngineError::LastCommitWasNotByFlexlate { .. }
            | EngineError::UnsafeUndo { .. } => ErrorCategory::Safety,
            EngineError::Git(_)
            | EngineError::Io { .. }
            | EngineError::RollbackIncomplete { .. } => ErrorCategory::Substrate,
            EngineError::Collaborator(_) => ErrorCategory::Collaborator,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}
