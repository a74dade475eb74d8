//! engine
//!
//! The transaction protocol: apply, merge, undo and push.
//!
//! # Architecture
//!
//! Git offers no transactions, so every mutating operation follows the same
//! discipline:
//!
//! ```text
//! Gate -> Snapshot -> Mutate in isolation -> Publish by CAS -> (Rollback)
//! ```
//!
//! 1. **Gate**: check preconditions, fail before anything is touched
//! 2. **Snapshot**: record the tips of every branch the operation may move
//! 3. **Mutate**: build new commits in a temporary clone, or plan entirely
//!    in memory (undo)
//! 4. **Publish**: move refs with compare-and-swap updates
//! 5. **Rollback**: on decline or error, restore the snapshot
//!
//! Flexlate history is read through the [`TransactionLog`], which turns
//! commit messages into structured records once and answers graph queries
//! against them.
//!
//! # Invariants
//!
//! - An aborted operation leaves every branch sha-identical to before
//! - Undo never discards a commit it cannot prove is flexlate's
//! - Collaborators (config store, conflict resolver) are passed in by the
//!   caller
//!
//! # Example
//!
//! ```ignore
//! use flexlate::engine::{ApplyRequest, BranchSynchronizer, DeclineConflicts, UndoEngine};
//! use flexlate::project::{AddTemplateSource, FileConfigStore, TemplateSource};
//!
//! let add = AddTemplateSource::new(TemplateSource::new("demo", "/tpl"), ".");
//! let request = ApplyRequest::new(add.transaction(), add.commit_message(), names.clone());
//! BranchSynchronizer::new(&git, &FileConfigStore, &DeclineConflicts).apply(&add, &request)?;
//!
//! UndoEngine::new(&git).undo(1, &names)?;
//! ```

pub mod conflict;
pub mod error;
pub mod gate;
pub mod log;
pub mod merge;
pub mod push;
pub mod snapshot;
pub mod sync;
pub mod undo;

pub use conflict::{ConflictResolver, DeclineConflicts, MergeConflict};
pub use error::{EngineError, ErrorCategory};
pub use log::{CommitKind, CommitRecord, MergePair, TransactionLog};
pub use merge::{MergeCoordinator, MergeOutcome, MergeRequest};
pub use push::{PushCoordinator, PushReport};
pub use snapshot::{BranchSnapshot, RollbackResult};
pub use sync::{ApplyOutcome, ApplyRequest, BranchSynchronizer, Mutation};
pub use undo::{UndoEngine, UndoReport};
