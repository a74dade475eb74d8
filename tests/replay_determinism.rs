//! Replaying the same transaction on identical repositories produces
//! identical commits.
//!
//! Commit dates come from `GIT_COMMITTER_DATE`, which is process-wide, so
//! these tests live in their own binary.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use flexlate::core::naming::{BranchNames, DEFAULT_MERGED_BRANCH, DEFAULT_TEMPLATE_BRANCH};
use flexlate::core::transaction::{Transaction, TransactionType};
use flexlate::core::types::{BranchName, Oid};
use flexlate::engine::{ApplyOutcome, ApplyRequest, BranchSynchronizer, DeclineConflicts, UndoEngine};
use flexlate::git::Git;
use flexlate::project::FileConfigStore;

const FIXED_DATE: &str = "1700000000 +0000";

struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);

        let repo = Self { dir };
        repo.commit_file("README.md", "# Project\n", "Initial commit");
        repo
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git(&self) -> Git {
        Git::open(self.path()).expect("failed to open test repo")
    }

    fn commit_file(&self, path: &str, content: &str, message: &str) {
        std::fs::write(self.path().join(path), content).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-m", message]);
    }

    fn tips(&self) -> Vec<Option<Oid>> {
        let git = self.git();
        [DEFAULT_TEMPLATE_BRANCH, DEFAULT_MERGED_BRANCH, "main"]
            .iter()
            .map(|name| git.branch_tip(&BranchName::new(*name).unwrap()).unwrap())
            .collect()
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", FIXED_DATE)
        .env("GIT_COMMITTER_DATE", FIXED_DATE)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn names() -> BranchNames {
    BranchNames::resolve(
        BranchName::new(DEFAULT_TEMPLATE_BRANCH).unwrap(),
        BranchName::new(DEFAULT_MERGED_BRANCH).unwrap(),
        BranchName::new("main").unwrap(),
        None,
    )
}

fn apply(repo: &TestRepo, tx: &Transaction, content: &str) -> ApplyOutcome {
    let mutation = |root: &Path| -> anyhow::Result<()> {
        std::fs::write(root.join("generated.txt"), content)?;
        Ok(())
    };
    let request = ApplyRequest::new(tx.clone(), "Update demo", names());
    BranchSynchronizer::new(&repo.git(), &FileConfigStore, &DeclineConflicts)
        .apply(&mutation, &request)
        .unwrap()
}

#[test]
fn same_transactions_produce_same_commits() {
    std::env::set_var("GIT_COMMITTER_DATE", FIXED_DATE);
    std::env::set_var("GIT_AUTHOR_DATE", FIXED_DATE);

    let first_tx = Transaction::new(TransactionType::AddSource).with_target("demo");
    let second_tx = Transaction::new(TransactionType::Update).with_target("demo");

    let left = TestRepo::new();
    let right = TestRepo::new();
    for repo in [&left, &right] {
        apply(repo, &first_tx, "v1\n");
        repo.commit_file("user.txt", "mine\n", "User work");
        apply(repo, &second_tx, "v2\n");
    }

    let left_tips = left.tips();
    assert!(left_tips.iter().all(Option::is_some));
    assert_eq!(left_tips, right.tips());

    // Undo is a pure function of the graph, so it lands on the same commits.
    let git = left.git();
    UndoEngine::new(&git).undo(1, &names()).unwrap();
    let git = right.git();
    UndoEngine::new(&git).undo(1, &names()).unwrap();
    assert_eq!(left.tips(), right.tips());
}
