//! Integration tests for the fxt binary.
//!
//! These tests exercise the full CLI and verify behavior against real Git repos.

use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Test fixture: a repository on `main` plus an isolated home directory so
/// no user configuration leaks in.
struct TestRepo {
    dir: TempDir,
    home: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let home = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        run_git(dir.path(), &["config", "commit.gpgsign", "false"]);

        std::fs::write(dir.path().join("README.md"), "# Project\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir, home }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `fxt --cwd <repo> --no-interactive <args>`.
    fn fxt(&self, args: &[&str]) -> Command {
        let mut cmd = fxt();
        cmd.env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path())
            .env_remove("FLEXLATE_CONFIG")
            .arg("--cwd")
            .arg(self.path())
            .arg("--no-interactive")
            .args(args);
        cmd
    }

    fn rev_parse(&self, rev: &str) -> Option<String> {
        let output = StdCommand::new("git")
            .args(["rev-parse", "--verify", "--quiet", rev])
            .current_dir(self.path())
            .output()
            .expect("git rev-parse failed");
        output
            .status
            .success()
            .then(|| String::from_utf8(output.stdout).unwrap().trim().to_string())
    }

    fn config(&self) -> Option<String> {
        std::fs::read_to_string(self.path().join("flexlate.json")).ok()
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
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

/// Get a command for running fxt.
fn fxt() -> Command {
    Command::cargo_bin("fxt").unwrap()
}

#[test]
fn help_lists_commands() {
    fxt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("undo"))
        .stdout(predicate::str::contains("add-source"))
        .stdout(predicate::str::contains("merge"));
}

#[test]
fn version_flag_works() {
    fxt()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fxt"));
}

#[test]
fn outside_a_repository_fails() {
    let dir = TempDir::new().unwrap();
    fxt()
        .arg("--cwd")
        .arg(dir.path())
        .arg("undo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn add_source_then_undo() {
    let repo = TestRepo::new();
    let root = repo.rev_parse("HEAD").unwrap();

    repo.fxt(&["add-source", "demo", "/templates/demo", "--version", "v1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Add template source demo"));

    let config = repo.config().expect("flexlate.json was not written");
    assert!(config.contains("\"demo\""), "{config}");
    assert!(config.contains("/templates/demo"), "{config}");
    assert!(repo.rev_parse("flexlate-templates").is_some());
    assert_eq!(repo.rev_parse("flexlate-output"), repo.rev_parse("main"));

    repo.fxt(&["undo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Undid 1"));

    assert!(repo.config().is_none());
    assert_eq!(repo.rev_parse("main"), Some(root.clone()));
    assert_eq!(repo.rev_parse("flexlate-templates"), Some(root));
}

#[test]
fn add_then_remove_source() {
    let repo = TestRepo::new();
    repo.fxt(&["add-source", "one", "/templates/one"])
        .assert()
        .success();
    repo.fxt(&["add-source", "two", "/templates/two"])
        .assert()
        .success();

    repo.fxt(&["remove-source", "one"]).assert().success();

    let config = repo.config().unwrap();
    assert!(!config.contains("\"one\""), "{config}");
    assert!(config.contains("\"two\""), "{config}");
}

#[test]
fn duplicate_source_fails_without_moving_branches() {
    let repo = TestRepo::new();
    repo.fxt(&["add-source", "demo", "/templates/demo"])
        .assert()
        .success();
    let before = (
        repo.rev_parse("flexlate-templates"),
        repo.rev_parse("flexlate-output"),
        repo.rev_parse("main"),
    );

    repo.fxt(&["add-source", "demo", "/elsewhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("demo"));

    let after = (
        repo.rev_parse("flexlate-templates"),
        repo.rev_parse("flexlate-output"),
        repo.rev_parse("main"),
    );
    assert_eq!(after, before);
}

#[test]
fn remove_unknown_source_fails() {
    let repo = TestRepo::new();
    repo.fxt(&["remove-source", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn undo_refuses_user_commits() {
    let repo = TestRepo::new();
    repo.fxt(&["add-source", "demo", "/templates/demo"])
        .assert()
        .success();
    std::fs::write(repo.path().join("user.txt"), "mine").unwrap();
    run_git(repo.path(), &["add", "user.txt"]);
    run_git(repo.path(), &["commit", "-m", "User work"]);

    repo.fxt(&["undo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not made by flexlate"));
}

#[test]
fn undo_zero_is_rejected() {
    let repo = TestRepo::new();
    repo.fxt(&["undo", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn dirty_worktree_blocks_operations() {
    let repo = TestRepo::new();
    std::fs::write(repo.path().join("scratch.txt"), "wip").unwrap();

    repo.fxt(&["add-source", "demo", "/templates/demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not clean"));
    assert!(repo.rev_parse("flexlate-templates").is_none());
}

#[test]
fn merge_without_feature_branches_fails() {
    let repo = TestRepo::new();
    repo.fxt(&["add-source", "demo", "/templates/demo"])
        .assert()
        .success();

    repo.fxt(&["merge", "--branch", "feature"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("flexlate-templates-feature"));
}

#[test]
fn push_main_to_bare_remote() {
    let repo = TestRepo::new();
    let remote = TempDir::new().unwrap();
    run_git(remote.path(), &["init", "--bare"]);
    run_git(
        repo.path(),
        &["remote", "add", "origin", remote.path().to_str().unwrap()],
    );
    repo.fxt(&["add-source", "demo", "/templates/demo"])
        .assert()
        .success();

    repo.fxt(&["push", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flexlate-templates"))
        .stdout(predicate::str::contains("flexlate-output"));

    let output = StdCommand::new("git")
        .args(["rev-parse", "refs/heads/flexlate-output"])
        .current_dir(remote.path())
        .output()
        .unwrap();
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        repo.rev_parse("flexlate-output").unwrap()
    );
}
