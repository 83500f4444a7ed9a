//! End-to-end tests for the `baseliner` binary against temporary git
//! repositories and a script standing in for mypy.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_MYPY: &str = "#!/bin/sh\nif [ -s diags.jsonl ]; then cat diags.jsonl; exit 1; fi\nexit 0\n";

fn mypy_line(file: &str, line: u32, code: &str, message: &str) -> String {
    format!(
        "{{\"file\": \"{file}\", \"line\": {line}, \"column\": 0, \"message\": \"{message}\", \"code\": \"{code}\", \"severity\": \"error\"}}\n"
    )
}

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git available");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct TestRepo {
    dir: TempDir,
    tools: TempDir,
    config: PathBuf,
}

impl TestRepo {
    /// A repository whose first commit (tagged `base`) carries one
    /// diagnostic, with the fake mypy wired in through a config file.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        run_git(path, &["init", "--quiet"]);
        run_git(path, &["config", "user.email", "test@example.com"]);
        run_git(path, &["config", "user.name", "Test"]);
        std::fs::write(path.join("a.py"), "x = 1\n").unwrap();
        let diags = mypy_line("a.py", 1, "assignment", "old");
        std::fs::write(path.join("diags.jsonl"), diags).unwrap();
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "--quiet", "-m", "base"]);
        run_git(path, &["tag", "base"]);

        let tools = TempDir::new().unwrap();
        let script = tools.path().join("fake-mypy");
        std::fs::write(&script, FAKE_MYPY).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = tools.path().join("baseliner.toml");
        std::fs::write(
            &config,
            format!(
                "baseline_dir = \"{}\"\nsnapshot_dir = \"{}\"\n\n[tools.mypy]\nbinary = \"{}\"\n",
                tools.path().join("baselines").display(),
                tools.path().join("snapshots").display(),
                script.display()
            ),
        )
        .unwrap();

        Self { dir, tools, config }
    }

    fn commit_diags(&self, lines: &[String]) {
        std::fs::write(self.dir.path().join("diags.jsonl"), lines.concat()).unwrap();
        run_git(self.dir.path(), &["commit", "--quiet", "-am", "change"]);
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("baseliner").unwrap();
        cmd.env_remove("CI")
            .env_remove("GITHUB_ACTIONS")
            .env_remove("GITHUB_BASE_REF")
            .env_remove("BASELINER_CONFIG")
            .env("RUST_LOG", "warn")
            .arg("--repo")
            .arg(self.dir.path())
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    fn baseline_file(&self) -> PathBuf {
        self.tools.path().join("baselines/mypy/root/base.json")
    }
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("baseliner")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("establish-baseline"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("clear-baseline"));
}

#[test]
fn bad_flag_is_invalid_invocation() {
    Command::cargo_bin("baseliner")
        .unwrap()
        .args(["compare", "root", "--no-such-flag"])
        .assert()
        .code(2);
}

#[test]
fn unknown_package_is_invalid_invocation() {
    let repo = TestRepo::new();
    repo.cmd()
        .args(["compare", "missing", "--against", "base"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown package 'missing'"));
}

#[test]
fn missing_repo_path_is_invalid_invocation() {
    let repo = TestRepo::new();
    Command::cargo_bin("baseliner")
        .unwrap()
        .env_remove("BASELINER_CONFIG")
        .arg("--repo")
        .arg(repo.dir.path().join("does-not-exist"))
        .args(["show-baseline", "root", "base"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("repository path"));
}

#[test]
fn missing_explicit_config_is_invalid_invocation() {
    let repo = TestRepo::new();
    Command::cargo_bin("baseliner")
        .unwrap()
        .env_remove("BASELINER_CONFIG")
        .arg("--repo")
        .arg(repo.dir.path())
        .arg("--config")
        .arg(repo.tools.path().join("nope.toml"))
        .args(["show-baseline", "root", "base"])
        .assert()
        .code(2);
}

#[test]
fn establish_then_compare_in_pipeline_mode_fails_on_new() {
    let repo = TestRepo::new();
    repo.cmd()
        .args(["establish-baseline", "root", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 diagnostic(s)"));
    assert!(repo.baseline_file().is_file());

    repo.commit_diags(&[
        mypy_line("a.py", 1, "assignment", "old"),
        mypy_line("a.py", 3, "arg-type", "new problem"),
    ]);

    let summary = repo.tools.path().join("summary.json");
    repo.cmd()
        .args(["compare", "root", "--against", "base", "--mode", "pipeline", "--summary-out"])
        .arg(&summary)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "::error file=a.py,line=3,col=1,title=mypy [arg-type]::new problem",
        ))
        .stdout(predicate::str::contains("1 new, 0 fixed, 1 unchanged"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["status"], "fail");
    assert_eq!(json["totals"]["new"], 1);
    assert_eq!(json["comparisons"][0]["new"][0]["fingerprint"].as_str().unwrap().len(), 16);
}

#[test]
fn local_mode_is_advisory() {
    let repo = TestRepo::new();
    repo.commit_diags(&[
        mypy_line("a.py", 1, "assignment", "old"),
        mypy_line("a.py", 5, "arg-type", "another"),
    ]);
    repo.cmd()
        .args(["compare", "root", "--against", "base", "--recompute-base", "--mode", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("advisory: 1 new"))
        .stdout(predicate::str::contains("::error").not());
}

#[test]
fn fixed_diagnostics_pass_in_pipeline_mode() {
    let repo = TestRepo::new();
    repo.commit_diags(&[]);
    repo.cmd()
        .args(["compare", "root", "--against", "base", "--recompute-base", "--mode", "pipeline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new, 1 fixed"))
        .stdout(predicate::str::contains("nice work"));
}

#[test]
fn first_adoption_reports_everything_as_new() {
    let repo = TestRepo::new();
    repo.cmd()
        .args(["compare", "root", "--against", "base", "--mode", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("first adoption run"))
        .stdout(predicate::str::contains("1 new, 0 fixed, 0 unchanged"));
}

#[test]
fn unknown_head_ref_fails_in_both_modes() {
    let repo = TestRepo::new();
    for mode in ["pipeline", "local"] {
        repo.cmd()
            .args(["compare", "root", "--against", "base"])
            .args(["--head", "no-such-branch", "--mode", mode])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("no-such-branch"));
    }
}

#[test]
fn show_and_clear_baseline() {
    let repo = TestRepo::new();
    repo.cmd()
        .args(["show-baseline", "root", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mypy/root@base: no baseline"));

    repo.cmd()
        .args(["establish-baseline", "root", "base"])
        .assert()
        .success();

    repo.cmd()
        .args(["show-baseline", "root", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mypy/root@base: 1 diagnostic(s)"))
        .stdout(predicate::str::contains("  a.py: 1"));

    repo.cmd()
        .args(["clear-baseline", "root", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed baseline mypy/root@base"));
    assert!(!repo.baseline_file().exists());
}
