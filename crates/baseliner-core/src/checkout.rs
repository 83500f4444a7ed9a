//! Isolated checkouts of arbitrary commits.
//!
//! Each checkout is a detached `git worktree` under a snapshot root, named
//! with a fresh token so concurrent checkouts (even of the same ref) never
//! share a path. The caller's working tree and index are never touched.
//!
//! [`Snapshot`] is a scoped guard: dropping it removes the worktree, so
//! cleanup runs on success, error, and cancellation alike. Prefer the async
//! [`Snapshot::release`] when an error should be surfaced.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{BaselineError, Result};
use crate::obs;

/// Default budget for creating or removing a snapshot.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(60);

/// Materializes commits as isolated filesystem snapshots.
#[derive(Debug, Clone)]
pub struct CheckoutManager {
    repo_root: PathBuf,
    snapshot_root: PathBuf,
    timeout: Duration,
}

impl CheckoutManager {
    /// Create a manager for the repository at `repo_root`, placing snapshots
    /// under `snapshot_root`.
    pub fn new(repo_root: impl Into<PathBuf>, snapshot_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            snapshot_root: snapshot_root.into(),
            timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Set the budget for snapshot creation and removal.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn snapshot_root(&self) -> &Path {
        &self.snapshot_root
    }

    /// Resolve `reference` (branch, tag, or SHA) to a full commit SHA.
    pub async fn resolve(&self, reference: &str) -> Result<String> {
        let not_found = || BaselineError::RefNotFound {
            reference: reference.to_string(),
            repo: self.repo_root.clone(),
        };
        if reference.is_empty() || reference.starts_with('-') {
            return Err(not_found());
        }

        let rev = format!("{reference}^{{commit}}");
        let output = run_git(
            &self.repo_root,
            &["rev-parse", "--verify", "--quiet", &rev],
            self.timeout,
        )
        .await
        .map_err(|reason| BaselineError::Checkout {
            reference: reference.to_string(),
            path: self.repo_root.clone(),
            reason,
        })?;

        if !output.status.success() {
            return Err(not_found());
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            return Err(not_found());
        }
        Ok(sha)
    }

    /// Materialize `reference` as an independent snapshot.
    ///
    /// Calling this twice for the same ref yields two snapshots that are
    /// released independently.
    pub async fn checkout(&self, reference: &str) -> Result<Snapshot> {
        let commit = self.resolve(reference).await?;
        let start = Instant::now();

        let path = self
            .snapshot_root
            .join(format!("baseliner-{}", uuid::Uuid::new_v4().simple()));
        let checkout_err = |reason: String| BaselineError::Checkout {
            reference: reference.to_string(),
            path: path.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&self.snapshot_root)
            .await
            .map_err(|e| checkout_err(format!("cannot create snapshot root: {e}")))?;

        // Guard first: anything after this point, including cancellation of
        // this future, cleans up through Drop.
        let snapshot = Snapshot {
            repo_root: self.repo_root.clone(),
            path: path.clone(),
            reference: reference.to_string(),
            commit: commit.clone(),
            timeout: self.timeout,
            released: false,
        };

        let path_arg = path.to_string_lossy().to_string();
        let output = run_git(
            &self.repo_root,
            &["worktree", "add", "--detach", "--quiet", &path_arg, &commit],
            self.timeout,
        )
        .await
        .map_err(&checkout_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(checkout_err(format!(
                "git worktree add exited with status {}: {stderr}",
                output
                    .status
                    .code()
                    .map_or_else(|| "none".to_string(), |c| c.to_string())
            )));
        }

        obs::emit_checkout_created(reference, &path, start.elapsed().as_millis() as u64);
        Ok(snapshot)
    }

    /// Repository-relative paths changed between `base` and `head`
    /// (relative to their merge base).
    pub async fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let base_sha = self.resolve(base).await?;
        let head_sha = self.resolve(head).await?;
        let range = format!("{base_sha}...{head_sha}");
        let output = run_git(
            &self.repo_root,
            &["diff", "--name-only", "--no-renames", &range],
            self.timeout,
        )
        .await
        .map_err(|reason| BaselineError::Checkout {
            reference: range.clone(),
            path: self.repo_root.clone(),
            reason,
        })?;

        if !output.status.success() {
            return Err(BaselineError::Checkout {
                reference: range,
                path: self.repo_root.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut files: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }
}

/// A materialized commit. Removed on [`Snapshot::release`] or drop.
#[derive(Debug)]
pub struct Snapshot {
    repo_root: PathBuf,
    path: PathBuf,
    reference: String,
    commit: String,
    timeout: Duration,
    released: bool,
}

impl Snapshot {
    /// Root of the snapshot's file tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The reference this snapshot was requested for.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The resolved commit SHA.
    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Remove the snapshot, surfacing failures.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let path_arg = self.path.to_string_lossy().to_string();
        let removed = run_git(
            &self.repo_root,
            &["worktree", "remove", "--force", &path_arg],
            self.timeout,
        )
        .await;

        let clean = matches!(&removed, Ok(out) if out.status.success());
        if !clean {
            debug!(path = %self.path.display(), "worktree remove failed, removing directory");
        }
        if self.path.exists() {
            tokio::fs::remove_dir_all(&self.path)
                .await
                .map_err(|e| BaselineError::Checkout {
                    reference: self.reference.clone(),
                    path: self.path.clone(),
                    reason: format!("cannot remove snapshot: {e}"),
                })?;
        }
        if !clean {
            let _ = run_git(&self.repo_root, &["worktree", "prune"], self.timeout).await;
        }

        obs::emit_checkout_released(&self.path, clean);
        Ok(())
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let _ = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["worktree", "remove", "--force"])
            .arg(&self.path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove snapshot");
            }
        }
        let _ = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["worktree", "prune"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        obs::emit_checkout_released(&self.path, false);
    }
}

/// Run git in `repo` with a deadline. Errors are human-readable reasons.
async fn run_git(
    repo: &Path,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<Output, String> {
    let child = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to run git: {e}"))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| format!("failed to run git: {e}")),
        Err(_) => Err(format!(
            "git {} timed out after {}s",
            args.first().copied().unwrap_or_default(),
            timeout.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.name", "test-user"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "--quiet", "-m", "initial"]);
        git(dir.path(), &["tag", "v1"]);
        std::fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "--quiet", "-m", "second"]);
        dir
    }

    fn manager(repo: &tempfile::TempDir, snaps: &tempfile::TempDir) -> CheckoutManager {
        CheckoutManager::new(repo.path(), snaps.path()).with_timeout(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn resolve_returns_full_sha() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let sha = manager(&repo, &snaps).resolve("HEAD").await.unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(sha, git(repo.path(), &["rev-parse", "HEAD"]));
    }

    #[tokio::test]
    async fn unknown_ref_is_ref_not_found() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let mgr = manager(&repo, &snaps);
        for bad in ["no-such-branch", "--help", ""] {
            match mgr.checkout(bad).await {
                Err(BaselineError::RefNotFound { reference, .. }) => assert_eq!(reference, bad),
                other => panic!("expected RefNotFound for {bad:?}, got {other:?}"),
            }
        }
        assert_eq!(std::fs::read_dir(snaps.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn checkout_materializes_historical_tree() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let snapshot = manager(&repo, &snaps).checkout("v1").await.unwrap();

        assert!(snapshot.path().join("a.py").exists());
        assert!(!snapshot.path().join("b.py").exists());
        assert_eq!(snapshot.reference(), "v1");

        let path = snapshot.path().to_path_buf();
        snapshot.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn same_ref_twice_gives_independent_snapshots() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let mgr = manager(&repo, &snaps);
        let first = mgr.checkout("HEAD").await.unwrap();
        let second = mgr.checkout("HEAD").await.unwrap();
        assert_ne!(first.path(), second.path());

        let second_path = second.path().to_path_buf();
        first.release().await.unwrap();
        assert!(second_path.join("b.py").exists());
        second.release().await.unwrap();
        assert!(!second_path.exists());
    }

    #[tokio::test]
    async fn drop_without_release_cleans_up() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let path = {
            let snapshot = manager(&repo, &snaps).checkout("HEAD").await.unwrap();
            snapshot.path().to_path_buf()
        };
        assert!(!path.exists());
        let worktrees = git(repo.path(), &["worktree", "list", "--porcelain"]);
        assert!(!worktrees.contains(path.to_string_lossy().as_ref()));
    }

    #[tokio::test]
    async fn changed_files_lists_diff() {
        let repo = make_git_repo();
        let snaps = tempfile::tempdir().unwrap();
        let files = manager(&repo, &snaps).changed_files("v1", "HEAD").await.unwrap();
        assert_eq!(files, vec!["b.py".to_string()]);
    }
}
