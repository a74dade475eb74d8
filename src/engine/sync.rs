//! engine::sync
//!
//! The branch synchronizer: drives one mutation into the three-branch
//! topology.
//!
//! # Algorithm
//!
//! 1. Gate, then snapshot the template, merged and active branches
//! 2. Clone into a temporary repository on the template branch (created
//!    from its base branch or the root commit if absent)
//! 3. Wipe tracked files, restore the root commit's files, and copy the
//!    project's metadata files across
//! 4. Run the mutation in the clone and commit it with the transaction
//!    envelope
//! 5. Fetch the template branch back and publish it with a CAS ref update
//! 6. Fast-forward the merged branch to the active branch without checking
//!    it out
//! 7. Check out merged, merge the template branch in
//! 8. Check out active, merge the merged branch in
//!
//! A declined conflict or any error restores the snapshot, so an aborted
//! apply leaves every branch sha-identical to before the call.

use std::path::{Path, PathBuf};

use super::conflict::{merge_resolving, ConflictResolver};
use super::error::EngineError;
use super::gate::{gate, requirements};
use super::snapshot::BranchSnapshot;
use crate::core::naming::BranchNames;
use crate::core::transaction::Transaction;
use crate::core::types::{Oid, RefName};
use crate::git::{EphemeralClone, Git, GitError};
use crate::project::ConfigStore;

/// A change to run against the template branch's working tree.
///
/// `root` is the working tree of a temporary clone, never the user's own.
pub trait Mutation {
    fn apply(&self, root: &Path) -> anyhow::Result<()>;
}

impl<F> Mutation for F
where
    F: Fn(&Path) -> anyhow::Result<()>,
{
    fn apply(&self, root: &Path) -> anyhow::Result<()> {
        self(root)
    }
}

/// What to apply and where.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Transaction stamped on the template commit
    pub transaction: Transaction,
    /// Human-readable commit message, before the envelope
    pub message: String,
    /// Output directory relative to the repository root
    pub out_root: PathBuf,
    /// Branches to work against
    pub names: BranchNames,
}

impl ApplyRequest {
    pub fn new(transaction: Transaction, message: impl Into<String>, names: BranchNames) -> Self {
        Self {
            transaction,
            message: message.into(),
            out_root: PathBuf::from("."),
            names,
        }
    }

    pub fn with_out_root(mut self, out_root: impl Into<PathBuf>) -> Self {
        self.out_root = out_root.into();
        self
    }
}

/// How an apply ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// All three branches were updated.
    Applied {
        template: Oid,
        merged: Oid,
        active: Oid,
    },
    /// A conflict was declined and everything was rolled back.
    Declined,
}

/// Applies mutations through a temporary clone.
pub struct BranchSynchronizer<'a> {
    git: &'a Git,
    store: &'a dyn ConfigStore,
    resolver: &'a dyn ConflictResolver,
}

impl<'a> BranchSynchronizer<'a> {
    pub fn new(
        git: &'a Git,
        store: &'a dyn ConfigStore,
        resolver: &'a dyn ConflictResolver,
    ) -> Self {
        Self {
            git,
            store,
            resolver,
        }
    }

    /// Apply `mutation` as `request.transaction`.
    ///
    /// # Errors
    ///
    /// Precondition errors before anything is touched; [`EngineError::NoChanges`]
    /// if the mutation changed nothing; substrate and collaborator errors
    /// after a full rollback. If the rollback itself cannot restore every
    /// branch, [`EngineError::RollbackIncomplete`] is returned instead,
    /// carrying the original error.
    pub fn apply(
        &self,
        mutation: &dyn Mutation,
        request: &ApplyRequest,
    ) -> Result<ApplyOutcome, EngineError> {
        let tx = &request.transaction;
        let span = tracing::info_span!("apply", tx = %tx.id(), kind = %tx.kind());
        let _enter = span.enter();

        let names = &request.names;
        gate(self.git, names, &requirements::MUTATING)?;

        let snapshot =
            BranchSnapshot::capture(self.git, &[&names.template, &names.merged, &names.active])?;
        let cwd = std::env::current_dir().ok();

        let result = match self.run(mutation, request, &snapshot) {
            Ok(ApplyOutcome::Declined) => {
                tracing::info!("conflict declined, rolling back");
                snapshot
                    .restore(self.git)
                    .check()
                    .map(|()| ApplyOutcome::Declined)
            }
            Ok(applied) => {
                self.recreate_out_root(&request.out_root);
                Ok(applied)
            }
            Err(err) => {
                tracing::warn!(%err, "apply failed, rolling back");
                Err(snapshot.restore(self.git).escalate(err))
            }
        };

        restore_cwd(cwd.as_deref());
        result
    }

    fn run(
        &self,
        mutation: &dyn Mutation,
        request: &ApplyRequest,
        snapshot: &BranchSnapshot,
    ) -> Result<ApplyOutcome, EngineError> {
        let git = self.git;
        let names = &request.names;

        let template = self.commit_template(mutation, request, snapshot)?;

        let active_tip = git.head_oid()?;
        self.fast_forward_merged(names, snapshot.tip(&names.merged), &active_tip)?;

        git.checkout_branch(&names.merged)?;
        if !merge_resolving(git, &names.template, &names.merged, &template, self.resolver)? {
            return Ok(ApplyOutcome::Declined);
        }
        let merged = git.head_oid()?;

        git.checkout_branch(&names.active)?;
        if !merge_resolving(git, &names.merged, &names.active, &merged, self.resolver)? {
            return Ok(ApplyOutcome::Declined);
        }
        let active = git.head_oid()?;

        tracing::info!(template = %template, merged = %merged, active = %active, "applied");
        Ok(ApplyOutcome::Applied {
            template,
            merged,
            active,
        })
    }

    /// Steps 2 to 5: commit the mutation on the template branch in a clone
    /// and publish it. Returns the new template tip.
    fn commit_template(
        &self,
        mutation: &dyn Mutation,
        request: &ApplyRequest,
        snapshot: &BranchSnapshot,
    ) -> Result<Oid, EngineError> {
        let git = self.git;
        let names = &request.names;
        let work_dir = git.work_dir()?.to_path_buf();
        let root_commit = git.root_commit()?;

        let start = match snapshot.tip(&names.template) {
            Some(tip) => tip.clone(),
            None if names.is_feature_scoped() => git
                .branch_tip(&names.base_template)?
                .unwrap_or_else(|| root_commit.clone()),
            None => root_commit.clone(),
        };

        let clone = EphemeralClone::of(git)?;
        let clone_git = clone.git();
        let clone_root = clone.path()?.to_path_buf();
        clone.checkout_at(&names.template, &start)?;

        clone_git.remove_tracked_files()?;
        clone_git.restore_files_from(&root_commit)?;
        self.store.copy_metadata(&work_dir, &clone_root)?;

        let mut dirs = vec![clone_root.join(&request.out_root)];
        if let Some(relative) = std::env::current_dir()
            .ok()
            .and_then(|cwd| cwd.strip_prefix(&work_dir).ok().map(Path::to_path_buf))
        {
            dirs.push(clone_root.join(relative));
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        }

        mutation.apply(&clone_root)?;

        let message = request.transaction.commit_message(&request.message);
        match clone_git.commit_all(&message) {
            Ok(oid) => tracing::debug!(oid = %oid, "committed template change"),
            Err(GitError::NothingToCommit) => return Err(EngineError::NoChanges),
            Err(e) => return Err(e.into()),
        }

        let tip = git.fetch_branch_from(&clone_root, &names.template)?;
        git.update_ref_cas(
            RefName::for_branch(&names.template).as_str(),
            &tip,
            snapshot.tip(&names.template),
            "flexlate: publish template",
        )?;
        tracing::debug!(branch = %names.template, oid = %tip, "published");
        Ok(tip)
    }

    /// Bring user commits from the active branch into the merged branch.
    fn fast_forward_merged(
        &self,
        names: &BranchNames,
        merged: Option<&Oid>,
        active: &Oid,
    ) -> Result<(), EngineError> {
        let git = self.git;
        let refname = RefName::for_branch(&names.merged);
        match merged {
            None => git.create_branch(&names.merged, active)?,
            Some(merged) if merged == active => {}
            Some(merged) if git.is_ancestor(merged, active)? => {
                git.update_ref_cas(
                    refname.as_str(),
                    active,
                    Some(merged),
                    "flexlate: fast-forward",
                )?;
            }
            // Merged already contains everything on active.
            Some(merged) if git.is_ancestor(active, merged)? => {}
            Some(_) => {
                return Err(GitError::NonFastForward {
                    branch: names.merged.to_string(),
                    from: names.active.to_string(),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Branch switches can delete the output directory or the directory the
    /// process is running in. Put them back.
    /// Checkouts delete directories that only held generated files; the
    /// output root must exist after an apply even when it is empty.
    fn recreate_out_root(&self, out_root: &Path) {
        if let Ok(work_dir) = self.git.work_dir() {
            let out = work_dir.join(out_root);
            if let Err(e) = std::fs::create_dir_all(&out) {
                tracing::warn!(path = %out.display(), %e, "cannot recreate output directory");
            }
        }
    }
}

/// Bring back the process working directory if a checkout removed it.
fn restore_cwd(cwd: Option<&Path>) {
    let Some(cwd) = cwd else { return };
    if cwd.exists() {
        return;
    }
    let restored = std::fs::create_dir_all(cwd).and_then(|_| std::env::set_current_dir(cwd));
    if let Err(e) = restored {
        tracing::warn!(path = %cwd.display(), %e, "cannot restore working directory");
    }
}
