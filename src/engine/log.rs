//! engine::log
//!
//! The transaction log: flexlate history read out of the commit graph.
//!
//! Transactions live in commit messages so plain git tooling keeps working,
//! but the engine never re-parses text ad hoc. Each commit it looks at is
//! classified once into a [`CommitRecord`] and cached by oid, and every
//! query below works on those records.
//!
//! # Merge pairs
//!
//! A commit is a flexlate merge commit only if its message is exactly the
//! one flexlate writes for a known `(source, target)` pair. Undo knows two
//! pairs: template into merged, and merged into the output branch.
//!
//! # Walks
//!
//! All graph walks are iterative with explicit work queues and visited
//! sets, so long-lived histories cannot exhaust the stack.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::error::EngineError;
use crate::core::transaction::{
    merge_commit_message, parse_merge_commit_message, Transaction, TransactionError,
};
use crate::core::types::{BranchName, Oid};
use crate::git::Git;

/// What a commit is, as far as flexlate is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitKind {
    /// Carries a transaction envelope.
    Transaction(Transaction),
    /// Has the exact text of a flexlate merge message.
    Merge {
        /// Branch that was merged in
        source: String,
        /// Branch that was merged into
        target: String,
    },
    /// Anything else: user commits, foreign merges, unreadable envelopes.
    Foreign,
}

/// A classified commit.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub oid: Oid,
    pub summary: String,
    pub parents: Vec<Oid>,
    pub kind: CommitKind,
}

impl CommitRecord {
    /// The transaction this commit carries directly, if any.
    pub fn transaction(&self) -> Option<&Transaction> {
        match &self.kind {
            CommitKind::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}

/// A `(source, target)` merge flexlate performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePair {
    pub source: BranchName,
    pub target: BranchName,
}

impl MergePair {
    pub fn new(source: BranchName, target: BranchName) -> Self {
        Self { source, target }
    }
}

/// The transaction parent of a flexlate merge commit and its other parent.
#[derive(Debug, Clone)]
pub struct MergeParents {
    /// Parent through which the transaction was merged in
    pub transaction_parent: Oid,
    /// The branch-side parent
    pub other_parent: Oid,
    /// Transaction the merge carries
    pub transaction: Transaction,
}

/// Queryable view of flexlate history.
#[derive(Debug)]
pub struct TransactionLog {
    pairs: Vec<MergePair>,
    records: RefCell<HashMap<Oid, Rc<CommitRecord>>>,
}

impl TransactionLog {
    /// A log that recognizes merges for the given pairs.
    pub fn new(pairs: Vec<MergePair>) -> Self {
        Self {
            pairs,
            records: RefCell::new(HashMap::new()),
        }
    }

    /// Envelope suffix for a commit message.
    pub fn encode(tx: &Transaction) -> String {
        tx.encode()
    }

    /// Read the transaction out of a commit message.
    pub fn parse(message: &str) -> Result<Transaction, TransactionError> {
        Transaction::parse_commit_message(message)
    }

    /// Classify a commit, consulting the cache first.
    pub fn record(&self, git: &Git, oid: &Oid) -> Result<Rc<CommitRecord>, EngineError> {
        if let Some(record) = self.records.borrow().get(oid) {
            return Ok(Rc::clone(record));
        }

        let info = git.commit_info(oid)?;
        let kind = match Self::parse(&info.message) {
            Ok(tx) => CommitKind::Transaction(tx),
            Err(TransactionError::InvalidEnvelope(err)) => {
                tracing::debug!(oid = %oid, %err, "unreadable transaction envelope");
                CommitKind::Foreign
            }
            Err(TransactionError::MissingDivider { .. }) => {
                match parse_merge_commit_message(&info.message) {
                    Some((source, target)) => CommitKind::Merge {
                        source: source.to_string(),
                        target: target.to_string(),
                    },
                    None => CommitKind::Foreign,
                }
            }
        };

        let record = Rc::new(CommitRecord {
            oid: info.oid,
            summary: info.summary,
            parents: info.parents,
            kind,
        });
        self.records
            .borrow_mut()
            .insert(oid.clone(), Rc::clone(&record));
        Ok(record)
    }

    /// True if `record` is exactly the merge of `template` into `merged`.
    pub fn is_merge_commit(
        record: &CommitRecord,
        merged: &BranchName,
        template: &BranchName,
    ) -> bool {
        match &record.kind {
            CommitKind::Merge { source, target } => {
                merge_commit_message(source, target)
                    == merge_commit_message(template.as_str(), merged.as_str())
            }
            _ => false,
        }
    }

    /// True if `record` is a merge for any pair this log knows.
    pub fn is_known_merge(&self, record: &CommitRecord) -> bool {
        self.pairs
            .iter()
            .any(|pair| Self::is_merge_commit(record, &pair.target, &pair.source))
    }

    /// True if `record` is a transaction commit or a known merge.
    pub fn is_flexlate(&self, record: &CommitRecord) -> bool {
        record.transaction().is_some() || self.is_known_merge(record)
    }

    fn check_merge_parents(record: &CommitRecord) -> Result<(), EngineError> {
        if record.parents.len() != 2 {
            return Err(EngineError::WrongParentCount {
                oid: record.oid.to_string(),
                count: record.parents.len(),
            });
        }
        Ok(())
    }

    /// Find the transaction reachable from `oid` through known merges.
    ///
    /// Returns the commit that carries the envelope along with the
    /// transaction, or None when `oid` is not flexlate history. At a merge
    /// the second parent (the side that was merged in) is tried first.
    fn locate(&self, git: &Git, oid: &Oid) -> Result<Option<(Oid, Transaction)>, EngineError> {
        let mut stack = vec![oid.clone()];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let record = self.record(git, &current)?;
            if let Some(tx) = record.transaction() {
                return Ok(Some((current, tx.clone())));
            }
            if self.is_known_merge(&record) {
                Self::check_merge_parents(&record)?;
                stack.push(record.parents[0].clone());
                stack.push(record.parents[1].clone());
            }
        }

        Ok(None)
    }

    /// The transaction `oid` belongs to, or None for foreign commits.
    ///
    /// # Errors
    ///
    /// Consistency errors when `oid` looks like a flexlate merge but its
    /// parentage does not add up.
    pub fn try_resolve(&self, git: &Git, oid: &Oid) -> Result<Option<Transaction>, EngineError> {
        let record = self.record(git, oid)?;
        if let Some(tx) = record.transaction() {
            return Ok(Some(tx.clone()));
        }
        if !self.is_known_merge(&record) {
            return Ok(None);
        }
        Ok(Some(self.merge_parents(git, oid)?.transaction))
    }

    /// The transaction `oid` belongs to.
    ///
    /// A transaction commit resolves to its own envelope. A known merge
    /// commit resolves through whichever parent carries a transaction.
    /// Anything else fails with the envelope parse error.
    pub fn resolve(&self, git: &Git, oid: &Oid) -> Result<Transaction, EngineError> {
        match self.try_resolve(git, oid)? {
            Some(tx) => Ok(tx),
            None => {
                let info = git.commit_info(oid)?;
                Ok(Self::parse(&info.message)?)
            }
        }
    }

    /// Split a known merge commit into its transaction parent and its other
    /// parent.
    pub fn merge_parents(&self, git: &Git, merge: &Oid) -> Result<MergeParents, EngineError> {
        let record = self.record(git, merge)?;
        if !self.is_known_merge(&record) {
            return Err(EngineError::ExpectedMergeCommit {
                oid: merge.to_string(),
            });
        }
        Self::check_merge_parents(&record)?;

        for (tx_side, other_side) in [(1, 0), (0, 1)] {
            if let Some((_, transaction)) = self.locate(git, &record.parents[tx_side])? {
                return Ok(MergeParents {
                    transaction_parent: record.parents[tx_side].clone(),
                    other_parent: record.parents[other_side].clone(),
                    transaction,
                });
            }
        }

        Err(EngineError::CannotFindMergeParent {
            oid: merge.to_string(),
        })
    }

    /// The earliest commit reachable from `tip` that is still part of `tx`.
    ///
    /// Walks single parents while they carry the same transaction id, and
    /// steps through known merges via their transaction parent.
    pub fn find_boundary(
        &self,
        git: &Git,
        tip: &Oid,
        tx: &Transaction,
    ) -> Result<Oid, EngineError> {
        let mut earliest: Option<Oid> = None;
        let mut current = tip.clone();
        let mut visited = HashSet::new();

        while visited.insert(current.clone()) {
            let record = self.record(git, &current)?;
            match &record.kind {
                CommitKind::Transaction(found) if found.id() == tx.id() => {
                    earliest = Some(current.clone());
                    match record.parents.as_slice() {
                        [parent] => current = parent.clone(),
                        _ => break,
                    }
                }
                _ if self.is_known_merge(&record) => {
                    let parents = self.merge_parents(git, &current)?;
                    if parents.transaction.id() != tx.id() {
                        break;
                    }
                    current = parents.transaction_parent;
                }
                _ => break,
            }
        }

        earliest.ok_or_else(|| EngineError::NotInTransaction {
            oid: tip.to_string(),
            tx: tx.id(),
        })
    }

    /// The earliest known merge commit reachable from `tip` whose
    /// transaction parent carries `tx`.
    ///
    /// Breadth-first from `tip`, following the branch-side parent of each
    /// matching merge. The search does not descend into the merged-in side,
    /// which holds the other branch's history rather than this one's.
    pub fn find_earliest_merge_for(
        &self,
        git: &Git,
        tip: &Oid,
        tx: &Transaction,
    ) -> Result<Option<Oid>, EngineError> {
        let mut queue = VecDeque::from([tip.clone()]);
        let mut visited = HashSet::new();
        let mut earliest = None;

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let record = self.record(git, &current)?;
            if !self.is_known_merge(&record) {
                continue;
            }
            let parents = self.merge_parents(git, &current)?;
            if parents.transaction.id() == tx.id() {
                earliest = Some(current);
                queue.push_back(parents.other_parent);
            }
        }

        Ok(earliest)
    }

    /// Fail unless every commit reachable from `end` but not from `start`
    /// is a transaction commit or a known merge.
    pub fn verify_corridor_safe(
        &self,
        git: &Git,
        start: &Oid,
        end: &Oid,
    ) -> Result<(), EngineError> {
        for oid in git.commits_between(Some(start), end)? {
            let record = self.record(git, &oid)?;
            if !self.is_flexlate(&record) {
                tracing::warn!(oid = %oid, summary = %record.summary, "foreign commit in undo range");
                return Err(EngineError::UnsafeUndo {
                    oid: oid.to_string(),
                    summary: record.summary.clone(),
                });
            }
        }
        Ok(())
    }
}
