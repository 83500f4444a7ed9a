//! Analysis tool execution against a snapshot.
//!
//! Runs an [`AnalysisTool`] inside a snapshot with a hard deadline and
//! captures its JSON. Exit codes the tool documents as "completed with
//! findings" are not errors; a crash exit code or an empty stream is.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{BaselineError, Result};
use crate::obs;
use crate::tools::{AnalysisTool, OutputChannel};

/// Default budget for a single tool run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest stderr excerpt carried into error messages.
const STDERR_EXCERPT: usize = 2000;

/// Captured output of one tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    /// Tool identifier.
    pub tool: String,

    /// Snapshot root the tool ran against.
    pub snapshot: PathBuf,

    /// Tool working directory, relative to the snapshot root.
    pub working_dir: PathBuf,

    /// Process exit code (`None` when killed by a signal or not run).
    pub exit_code: Option<i32>,

    /// The JSON payload (stdout or the tool's output file).
    pub content: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// The run was skipped because no target file exists in the snapshot.
    pub skipped: bool,
}

/// Executes analysis tools with a deadline.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `tool` in `snapshot.join(working_dir)`.
    ///
    /// `targets` are repository-relative files; `None` analyzes the whole
    /// working directory. Targets missing from this snapshot or outside the
    /// working directory are skipped silently.
    pub async fn run(
        &self,
        tool: &dyn AnalysisTool,
        snapshot: &Path,
        working_dir: &Path,
        targets: Option<&[String]>,
    ) -> Result<RawOutput> {
        let cwd = snapshot.join(working_dir);
        let mut raw = RawOutput {
            tool: tool.id().to_string(),
            snapshot: snapshot.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            exit_code: None,
            content: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            skipped: false,
        };

        let target_paths = match targets {
            Some(files) if tool.supports_file_targets() => {
                let present = present_targets(snapshot, working_dir, files);
                if present.is_empty() {
                    debug!(tool = %tool.id(), "no target files present in snapshot, skipping");
                    raw.skipped = true;
                    return Ok(raw);
                }
                present
            }
            _ => Vec::new(),
        };

        let out_dir = tempfile::tempdir()?;
        let output_file = out_dir.path().join(format!("{}.json", tool.id()));
        let invocation = tool.invocation(&target_paths, &output_file);

        let start = Instant::now();
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BaselineError::ToolNotFound {
                tool: tool.id().to_string(),
                reason: format!("failed to spawn {}: {e}", invocation.program.display()),
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| BaselineError::ToolOutput {
            tool: raw.tool.clone(),
            snapshot: raw.snapshot.clone(),
            exit_code: None,
            reason: "stdout was not captured".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| BaselineError::ToolOutput {
            tool: raw.tool.clone(),
            snapshot: raw.snapshot.clone(),
            exit_code: None,
            reason: "stderr was not captured".to_string(),
        })?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(tool = %tool.id(), error = %e, "failed to kill timed-out tool");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(BaselineError::ToolTimeout {
                    tool: raw.tool,
                    snapshot: raw.snapshot,
                    timeout: self.timeout,
                });
            }
        };

        let stdout = join_output(stdout_task.await)?;
        raw.stderr = String::from_utf8_lossy(&join_output(stderr_task.await)?).to_string();
        raw.exit_code = status.code();
        raw.duration_ms = start.elapsed().as_millis() as u64;
        raw.content = match invocation.output {
            OutputChannel::Stdout => String::from_utf8_lossy(&stdout).to_string(),
            OutputChannel::File => match tokio::fs::read_to_string(&output_file).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            },
        };

        obs::emit_tool_finished(&raw.tool, raw.exit_code, raw.duration_ms, raw.content.len());
        check_completion(tool, &raw)?;
        Ok(raw)
    }
}

fn join_output(
    joined: std::result::Result<std::io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> Result<Vec<u8>> {
    joined
        .map_err(|e| BaselineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(BaselineError::Io)
}

/// Reject crash exits and empty streams.
fn check_completion(tool: &dyn AnalysisTool, raw: &RawOutput) -> Result<()> {
    let completed = raw
        .exit_code
        .is_some_and(|code| tool.completion_exit_codes().contains(&code));
    let output_err = |reason: String| BaselineError::ToolOutput {
        tool: raw.tool.clone(),
        snapshot: raw.snapshot.clone(),
        exit_code: raw.exit_code,
        reason,
    };

    if !completed {
        return Err(output_err(format!(
            "tool did not complete: {}",
            stderr_excerpt(&raw.stderr)
        )));
    }

    if raw.content.trim().is_empty() {
        let clean_exit = raw.exit_code == Some(0);
        if !(clean_exit && tool.empty_output_is_clean()) {
            return Err(output_err(format!(
                "empty output stream: {}",
                stderr_excerpt(&raw.stderr)
            )));
        }
    }
    Ok(())
}

fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "(no stderr)".to_string();
    }
    let mut excerpt: String = trimmed.chars().take(STDERR_EXCERPT).collect();
    if excerpt.len() < trimmed.len() {
        excerpt.push_str("...");
    }
    excerpt
}

/// Targets that exist in the snapshot and live under `working_dir`,
/// re-expressed relative to `working_dir`.
fn present_targets(snapshot: &Path, working_dir: &Path, files: &[String]) -> Vec<PathBuf> {
    let mut present: Vec<PathBuf> = files
        .iter()
        .map(|f| PathBuf::from(f.replace('\\', "/")))
        .filter(|rel| snapshot.join(rel).is_file())
        .filter_map(|rel| {
            if working_dir.as_os_str().is_empty() || working_dir == Path::new(".") {
                Some(rel)
            } else {
                rel.strip_prefix(working_dir).ok().map(Path::to_path_buf)
            }
        })
        .collect();
    present.sort();
    present.dedup();
    present
}
