//! Integration tests for applying and undoing transactions.
//!
//! Each test builds a real repository, drives the branch synchronizer and
//! the undo engine against it, and checks branch tips with git itself.

use std::cell::Cell;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use flexlate::core::naming::{BranchNames, DEFAULT_MERGED_BRANCH, DEFAULT_TEMPLATE_BRANCH};
use flexlate::core::transaction::{TemplateData, Transaction, TransactionType};
use flexlate::core::types::{BranchName, Oid};
use flexlate::engine::{
    ApplyOutcome, ApplyRequest, BranchSynchronizer, ConflictResolver, DeclineConflicts,
    EngineError, MergeConflict, MergePair, Mutation, TransactionLog, UndoEngine,
};
use flexlate::git::{Git, GitState};
use flexlate::project::{
    update_transaction, AddAppliedTemplate, AddTemplateSource, AppliedTemplate, FileConfigStore,
    FlexlateConfig, RenderTemplates, TemplateSource,
};

/// Test fixture that creates a real git repository on `main`.
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

        std::fs::write(dir.path().join("README.md"), "# Project\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git(&self) -> Git {
        Git::open(self.path()).expect("failed to open test repo")
    }

    fn commit_file(&self, path: &str, content: &str, message: &str) -> Oid {
        std::fs::write(self.path().join(path), content).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-m", message]);
        self.git().head_oid().unwrap()
    }

    fn checkout(&self, name: &str) {
        run_git(self.path(), &["checkout", name]);
    }

    fn tip(&self, branch: &str) -> Option<Oid> {
        self.git().branch_tip(&b(branch)).unwrap()
    }

    /// Tips of the template, merged and main branches.
    fn tips(&self) -> [Option<Oid>; 3] {
        [
            self.tip(DEFAULT_TEMPLATE_BRANCH),
            self.tip(DEFAULT_MERGED_BRANCH),
            self.tip("main"),
        ]
    }

    fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.path().join(path)).ok()
    }

    fn git_output(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("git command failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
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

fn b(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

fn names(active: &str) -> BranchNames {
    BranchNames::resolve(
        b(DEFAULT_TEMPLATE_BRANCH),
        b(DEFAULT_MERGED_BRANCH),
        b(active),
        None,
    )
}

fn update(target: &str) -> Transaction {
    Transaction::new(TransactionType::Update).with_target(target)
}

/// Apply a mutation that writes `files` under the template root.
fn apply_files(
    git: &Git,
    tx: Transaction,
    files: &[(&str, &str)],
    resolver: &dyn ConflictResolver,
) -> Result<ApplyOutcome, EngineError> {
    let mutation = |root: &Path| -> anyhow::Result<()> {
        for (path, content) in files {
            std::fs::write(root.join(path), content)?;
        }
        Ok(())
    };
    let request = ApplyRequest::new(tx, "Update demo", names("main"));
    BranchSynchronizer::new(git, &FileConfigStore, resolver).apply(&mutation, &request)
}

fn applied(outcome: ApplyOutcome) -> (Oid, Oid, Oid) {
    match outcome {
        ApplyOutcome::Applied {
            template,
            merged,
            active,
        } => (template, merged, active),
        ApplyOutcome::Declined => panic!("apply was declined"),
    }
}

// =============================================================================
// Apply
// =============================================================================

mod apply {
    use super::*;

    #[test]
    fn first_apply_fast_forwards_every_branch() {
        let repo = TestRepo::new();
        let git = repo.git();
        let root = git.head_oid().unwrap();
        let tx = update("demo");

        let (template, merged, active) = applied(
            apply_files(&git, tx.clone(), &[("a.txt", "one\n")], &DeclineConflicts).unwrap(),
        );

        assert_eq!(template, merged);
        assert_eq!(merged, active);
        assert_eq!(git.commit_parents(&template).unwrap(), vec![root]);
        assert_eq!(repo.read("a.txt").as_deref(), Some("one\n"));
        assert_eq!(git.current_branch().unwrap(), Some(b("main")));

        let message = git.commit_info(&template).unwrap().message;
        assert!(message.starts_with("Update demo"));
        assert_eq!(TransactionLog::parse(&message).unwrap(), tx);
    }

    #[test]
    fn user_commits_are_merged_not_replayed() {
        let repo = TestRepo::new();
        let user = repo.commit_file("user.txt", "mine\n", "User work");
        let git = repo.git();

        let (template, merged, active) = applied(
            apply_files(&git, update("demo"), &[("a.txt", "one\n")], &DeclineConflicts).unwrap(),
        );

        assert_eq!(active, merged);
        assert_eq!(git.commit_parents(&merged).unwrap(), vec![user, template]);
        assert_eq!(
            git.commit_info(&merged).unwrap().message,
            "Merge branch 'flexlate-templates' into flexlate-output\n"
        );
        assert_eq!(repo.read("user.txt").as_deref(), Some("mine\n"));
        assert_eq!(repo.read("a.txt").as_deref(), Some("one\n"));
    }

    #[test]
    fn template_commits_use_the_user_identity() {
        let repo = TestRepo::new();
        apply_files(&repo.git(), update("demo"), &[("a.txt", "one\n")], &DeclineConflicts)
            .unwrap();

        assert_eq!(
            repo.git_output(&["log", "-1", "--format=%an <%ae>", DEFAULT_TEMPLATE_BRANCH]),
            "Test User <test@example.com>"
        );
    }

    #[test]
    fn project_metadata_reaches_the_template_branch() {
        let repo = TestRepo::new();
        repo.commit_file(
            "flexlate.json",
            "{\"template_sources\": [], \"applied_templates\": []}\n",
            "Add config",
        );

        apply_files(&repo.git(), update("demo"), &[("a.txt", "one\n")], &DeclineConflicts)
            .unwrap();

        let files = repo.git_output(&["ls-tree", "--name-only", DEFAULT_TEMPLATE_BRANCH]);
        assert!(files.lines().any(|f| f == "flexlate.json"), "{files}");
        assert!(files.lines().any(|f| f == "a.txt"), "{files}");
    }

    #[test]
    fn unchanged_template_is_rejected() {
        let repo = TestRepo::new();
        let before = repo.tips();

        let result = apply_files(&repo.git(), update("demo"), &[], &DeclineConflicts);
        assert!(matches!(result, Err(EngineError::NoChanges)));
        assert_eq!(repo.tips(), before);
    }

    #[test]
    fn dirty_worktree_is_refused() {
        let repo = TestRepo::new();
        std::fs::write(repo.path().join("scratch.txt"), "wip").unwrap();

        let result = apply_files(&repo.git(), update("demo"), &[("a.txt", "x")], &DeclineConflicts);
        assert!(matches!(result, Err(EngineError::DirtyWorkingTree { .. })));
        assert!(repo.tip(DEFAULT_TEMPLATE_BRANCH).is_none());
    }

    #[test]
    fn flexlate_branches_are_refused_as_active() {
        let repo = TestRepo::new();
        apply_files(&repo.git(), update("demo"), &[("a.txt", "x")], &DeclineConflicts).unwrap();
        repo.checkout(DEFAULT_MERGED_BRANCH);

        let git = repo.git();
        let mutation = |root: &Path| -> anyhow::Result<()> {
            std::fs::write(root.join("b.txt"), "y")?;
            Ok(())
        };
        let request = ApplyRequest::new(update("demo"), "Update", names(DEFAULT_MERGED_BRANCH));
        let result =
            BranchSynchronizer::new(&git, &FileConfigStore, &DeclineConflicts).apply(&mutation, &request);
        assert!(matches!(result, Err(EngineError::OnFlexlateBranch { .. })));
    }

    #[test]
    fn failing_mutation_rolls_back() {
        let repo = TestRepo::new();
        apply_files(&repo.git(), update("demo"), &[("a.txt", "x")], &DeclineConflicts).unwrap();
        let before = repo.tips();

        let git = repo.git();
        let mutation = |_: &Path| -> anyhow::Result<()> { anyhow::bail!("renderer exploded") };
        let request = ApplyRequest::new(update("demo"), "Update", names("main"));
        let result =
            BranchSynchronizer::new(&git, &FileConfigStore, &DeclineConflicts).apply(&mutation, &request);

        assert!(matches!(result, Err(EngineError::Collaborator(_))));
        assert_eq!(repo.tips(), before);
        assert!(git.worktree_status(true).unwrap().is_pristine());
    }
}

// =============================================================================
// Conflicts
// =============================================================================

mod conflicts {
    use super::*;

    /// main has a user edit to the file the next apply rewrites.
    fn conflicting_repo() -> TestRepo {
        let repo = TestRepo::new();
        apply_files(
            &repo.git(),
            update("demo"),
            &[("config.txt", "template v1\n")],
            &DeclineConflicts,
        )
        .unwrap();
        repo.commit_file("config.txt", "user edit\n", "Customize config");
        repo
    }

    #[test]
    fn declined_conflict_restores_every_branch() {
        let repo = conflicting_repo();
        let before = repo.tips();
        let asked = Cell::new(0);
        let resolver = |conflict: &MergeConflict| {
            asked.set(asked.get() + 1);
            assert_eq!(conflict.paths, vec![std::path::PathBuf::from("config.txt")]);
            false
        };

        let outcome = apply_files(
            &repo.git(),
            update("demo"),
            &[("config.txt", "template v2\n")],
            &resolver,
        )
        .unwrap();

        assert_eq!(outcome, ApplyOutcome::Declined);
        assert_eq!(asked.get(), 1);
        assert_eq!(repo.tips(), before);
        let git = repo.git();
        assert_eq!(git.state(), GitState::Clean);
        assert_eq!(git.current_branch().unwrap(), Some(b("main")));
        assert!(git.worktree_status(true).unwrap().is_pristine());
        assert_eq!(repo.read("config.txt").as_deref(), Some("user edit\n"));
    }

    #[test]
    fn accepted_conflict_is_committed_and_undoable() {
        let repo = conflicting_repo();
        let user = repo.tip("main").unwrap();
        let template_before = repo.tip(DEFAULT_TEMPLATE_BRANCH).unwrap();
        let resolver = |conflict: &MergeConflict| {
            std::fs::write(conflict.work_dir.join("config.txt"), "resolved\n").unwrap();
            true
        };

        let (template, merged, active) = applied(
            apply_files(
                &repo.git(),
                update("demo"),
                &[("config.txt", "template v2\n")],
                &resolver,
            )
            .unwrap(),
        );

        let git = repo.git();
        assert_eq!(merged, active);
        assert_eq!(git.commit_parents(&merged).unwrap(), vec![user.clone(), template]);
        assert_eq!(repo.read("config.txt").as_deref(), Some("resolved\n"));

        let report = UndoEngine::new(&git).undo(1, &names("main")).unwrap();
        assert_eq!(report.undone.len(), 1);
        assert_eq!(repo.tip("main"), Some(user.clone()));
        assert_eq!(repo.tip(DEFAULT_MERGED_BRANCH), Some(user));
        assert_eq!(repo.tip(DEFAULT_TEMPLATE_BRANCH), Some(template_before));
        assert_eq!(repo.read("config.txt").as_deref(), Some("user edit\n"));
    }

    #[test]
    fn merge_committed_by_the_git_cli_is_kept_and_undoable() {
        let repo = conflicting_repo();
        let user = repo.tip("main").unwrap();
        let template_before = repo.tip(DEFAULT_TEMPLATE_BRANCH).unwrap();
        let resolver = |conflict: &MergeConflict| {
            std::fs::write(conflict.work_dir.join("config.txt"), "resolved\n").unwrap();
            run_git(&conflict.work_dir, &["add", "-A"]);
            run_git(&conflict.work_dir, &["commit", "--no-edit"]);
            true
        };

        let (template, merged, active) = applied(
            apply_files(
                &repo.git(),
                update("demo"),
                &[("config.txt", "template v2\n")],
                &resolver,
            )
            .unwrap(),
        );

        let git = repo.git();
        assert_eq!(merged, active);
        assert_eq!(git.commit_parents(&merged).unwrap(), vec![user.clone(), template]);
        assert_eq!(
            git.commit_info(&merged).unwrap().message,
            "Merge branch 'flexlate-templates' into flexlate-output\n"
        );
        assert_eq!(git.state(), GitState::Clean);
        assert!(git.worktree_status(true).unwrap().is_pristine());

        UndoEngine::new(&git).undo(1, &names("main")).unwrap();
        assert_eq!(repo.tip("main"), Some(user.clone()));
        assert_eq!(repo.tip(DEFAULT_MERGED_BRANCH), Some(user));
        assert_eq!(repo.tip(DEFAULT_TEMPLATE_BRANCH), Some(template_before));
    }

    #[test]
    fn branch_that_cannot_be_restored_is_reported() {
        let repo = conflicting_repo();
        let before = repo.tips();
        let lock = repo
            .path()
            .join(".git/refs/heads")
            .join(format!("{DEFAULT_TEMPLATE_BRANCH}.lock"));
        let resolver = |_: &MergeConflict| {
            std::fs::write(&lock, "").unwrap();
            false
        };

        let result = apply_files(
            &repo.git(),
            update("demo"),
            &[("config.txt", "template v2\n")],
            &resolver,
        );

        match result {
            Err(EngineError::RollbackIncomplete { summary, cause }) => {
                assert!(summary.contains(DEFAULT_TEMPLATE_BRANCH), "{summary}");
                assert!(cause.is_none());
            }
            other => panic!("expected RollbackIncomplete, got {other:?}"),
        }
        std::fs::remove_file(&lock).unwrap();

        let after = repo.tips();
        assert_ne!(after[0], before[0]);
        assert_eq!(after[1..], before[1..]);
        assert_eq!(repo.git().current_branch().unwrap(), Some(b("main")));
    }

    #[test]
    fn declined_apply_leaves_no_output_directory() {
        let repo = conflicting_repo();
        let git = repo.git();
        let mutation = |root: &Path| -> anyhow::Result<()> {
            std::fs::write(root.join("config.txt"), "template v2\n")?;
            Ok(())
        };
        let request =
            ApplyRequest::new(update("demo"), "Update demo", names("main")).with_out_root("generated");

        let outcome = BranchSynchronizer::new(&git, &FileConfigStore, &DeclineConflicts)
            .apply(&mutation, &request)
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Declined);
        assert!(!repo.path().join("generated").exists());
        assert!(git.worktree_status(true).unwrap().is_pristine());
    }
}

// =============================================================================
// Undo
// =============================================================================

mod undo {
    use super::*;

    #[test]
    fn undo_single_apply_returns_to_root() {
        let repo = TestRepo::new();
        let git = repo.git();
        let root = git.head_oid().unwrap();
        let tx = update("demo");
        apply_files(&git, tx.clone(), &[("a.txt", "one\n")], &DeclineConflicts).unwrap();

        let report = UndoEngine::new(&git).undo(1, &names("main")).unwrap();

        assert_eq!(report.undone, vec![tx]);
        assert_eq!(repo.tips(), [Some(root.clone()), Some(root.clone()), Some(root)]);
        assert!(repo.read("a.txt").is_none());
        assert!(git.worktree_status(true).unwrap().is_pristine());
    }

    #[test]
    fn undo_reports_newest_first_and_stops_at_history() {
        let repo = TestRepo::new();
        let git = repo.git();
        let (first, second, third) = (update("one"), update("two"), update("three"));
        apply_files(&git, first.clone(), &[("a.txt", "1")], &DeclineConflicts).unwrap();
        let after_first = repo.tips();
        apply_files(&git, second.clone(), &[("a.txt", "2")], &DeclineConflicts).unwrap();
        apply_files(&git, third.clone(), &[("a.txt", "3")], &DeclineConflicts).unwrap();

        let report = UndoEngine::new(&git).undo(2, &names("main")).unwrap();
        assert_eq!(report.undone, vec![third, second]);
        assert_eq!(repo.tips(), after_first);
        assert_eq!(repo.read("a.txt").as_deref(), Some("1"));

        let result = UndoEngine::new(&git).undo(5, &names("main"));
        assert!(matches!(
            result,
            Err(EngineError::TooFewTransactions {
                requested: 5,
                found: 1
            })
        ));
        assert_eq!(repo.tips(), after_first);
    }

    /// Add a source, apply it, then re-render: three transactions built
    /// from the project mutations.
    #[test]
    fn undo_project_operations_back_to_the_source() {
        let repo = TestRepo::new();
        let git = repo.git();
        let pass = Cell::new(0);
        let renderer = |_: &TemplateSource, data: &TemplateData, out: &Path| -> anyhow::Result<()> {
            pass.set(pass.get() + 1);
            std::fs::write(
                out.join("generated.txt"),
                format!("{} render {}\n", data["name"], pass.get()),
            )?;
            Ok(())
        };
        let run = |mutation: &dyn Mutation, tx: Transaction, message: String| {
            let request = ApplyRequest::new(tx, message, names("main"));
            applied(
                BranchSynchronizer::new(&git, &FileConfigStore, &DeclineConflicts)
                    .apply(mutation, &request)
                    .unwrap(),
            )
        };

        let add_source = AddTemplateSource::new(TemplateSource::new("tpl", "templates/tpl"), ".");
        let source_tx = add_source.transaction();
        run(&add_source, source_tx.clone(), add_source.commit_message());
        let after_source = repo.tips();

        let mut data = TemplateData::new();
        data.insert("name".to_string(), serde_json::json!("demo"));
        let add_output = AddAppliedTemplate::new(
            AppliedTemplate {
                name: "tpl".to_string(),
                data,
                version: "v1".to_string(),
                root: ".".into(),
            },
            ".",
            repo.path(),
            renderer,
        );
        let output_tx = add_output.transaction();
        run(&add_output, output_tx.clone(), add_output.commit_message());
        assert_eq!(repo.read("generated.txt").as_deref(), Some("\"demo\" render 1\n"));

        let render = RenderTemplates::new(".", repo.path(), renderer);
        let update_tx = update_transaction(Some("tpl"), Path::new("."));
        run(&render, update_tx.clone(), "Update tpl".to_string());
        assert_eq!(repo.read("generated.txt").as_deref(), Some("\"demo\" render 2\n"));

        let report = UndoEngine::new(&git).undo(2, &names("main")).unwrap();
        assert_eq!(report.undone, vec![update_tx, output_tx]);
        assert_eq!(repo.tips(), after_source);
        assert!(repo.read("generated.txt").is_none());

        let log = TransactionLog::new(vec![
            MergePair::new(b(DEFAULT_TEMPLATE_BRANCH), b(DEFAULT_MERGED_BRANCH)),
            MergePair::new(b(DEFAULT_MERGED_BRANCH), b("main")),
        ]);
        let [template, merged, _] = repo.tips();
        assert_eq!(log.resolve(&git, &template.unwrap()).unwrap(), source_tx);
        assert_eq!(log.resolve(&git, &merged.unwrap()).unwrap(), source_tx);
        let config: FlexlateConfig =
            serde_json::from_str(&repo.read("flexlate.json").unwrap()).unwrap();
        assert!(config.source("tpl").is_some());
        assert!(config.applied_templates.is_empty());

        let result = UndoEngine::new(&git).undo(5, &names("main"));
        assert!(matches!(
            result,
            Err(EngineError::TooFewTransactions {
                requested: 5,
                found: 1
            })
        ));
        assert_eq!(repo.tips(), after_source);
    }

    #[test]
    fn undo_refuses_foreign_tip() {
        let repo = TestRepo::new();
        apply_files(&repo.git(), update("demo"), &[("a.txt", "x")], &DeclineConflicts).unwrap();
        repo.commit_file("user.txt", "mine", "User work");
        let before = repo.tips();

        let result = UndoEngine::new(&repo.git()).undo(1, &names("main"));
        assert!(matches!(
            result,
            Err(EngineError::LastCommitWasNotByFlexlate { .. })
        ));
        assert_eq!(repo.tips(), before);
    }

    #[test]
    fn undo_refuses_to_discard_foreign_template_commit() {
        let repo = TestRepo::new();
        apply_files(&repo.git(), update("one"), &[("a.txt", "1")], &DeclineConflicts).unwrap();

        repo.checkout(DEFAULT_TEMPLATE_BRANCH);
        repo.commit_file("manual.txt", "hand edit", "Edit template by hand");
        repo.checkout("main");
        repo.commit_file("user.txt", "mine", "User work");

        apply_files(&repo.git(), update("two"), &[("a.txt", "2")], &DeclineConflicts).unwrap();
        let before = repo.tips();

        let result = UndoEngine::new(&repo.git()).undo(1, &names("main"));
        match result {
            Err(EngineError::UnsafeUndo { summary, .. }) => {
                assert_eq!(summary, "Edit template by hand")
            }
            other => panic!("expected UnsafeUndo, got {other:?}"),
        }
        assert_eq!(repo.tips(), before);
    }

    #[test]
    fn undo_zero_is_invalid() {
        let repo = TestRepo::new();
        let result = UndoEngine::new(&repo.git()).undo(0, &names("main"));
        assert!(matches!(result, Err(EngineError::InvalidCount)));
    }

    #[test]
    fn undo_without_flexlate_branches_is_refused() {
        let repo = TestRepo::new();
        let result = UndoEngine::new(&repo.git()).undo(1, &names("main"));
        assert!(matches!(result, Err(EngineError::MissingBranch { .. })));
    }

    #[test]
    fn apply_then_undo_round_trips() {
        let repo = TestRepo::new();
        let git = repo.git();
        apply_files(&git, update("one"), &[("a.txt", "1")], &DeclineConflicts).unwrap();
        let before = repo.tips();
        let files_before = repo.read("a.txt");

        apply_files(&git, update("two"), &[("a.txt", "2"), ("b.txt", "new")], &DeclineConflicts)
            .unwrap();
        UndoEngine::new(&git).undo(1, &names("main")).unwrap();

        assert_eq!(repo.tips(), before);
        assert_eq!(repo.read("a.txt"), files_before);
        assert!(repo.read("b.txt").is_none());
    }
}
