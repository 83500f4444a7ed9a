//! Configuration loading and run-environment detection.
//!
//! Configuration lives in `baseliner.toml` at the repository root:
//!
//! ```toml
//! baseline_dir = ".baselines"
//! tool_timeout_secs = 600
//! checkout_timeout_secs = 60
//!
//! [refs]
//! pipeline = "origin/main"
//! local = "main"
//!
//! [packages.core]
//! path = "packages/core"
//! tools = ["mypy", "deptry"]
//!
//! [tools.mypy]
//! args = ["--strict"]
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BaselineError, Result};
use crate::report::Mode;
use crate::tools::{ToolSettings, KNOWN_TOOLS};

/// Default configuration file name, relative to the repository root.
pub const CONFIG_FILE: &str = "baseliner.toml";

/// Name of the implicit package used when none is configured.
pub const DEFAULT_PACKAGE: &str = "root";

/// Default reference commits per mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RefDefaults {
    pub pipeline: String,
    pub local: String,
}

impl Default for RefDefaults {
    fn default() -> Self {
        Self {
            pipeline: "origin/main".to_string(),
            local: "main".to_string(),
        }
    }
}

/// One analyzable package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Directory relative to the repository root; tools run from here.
    pub path: PathBuf,

    /// Tool identifiers to run.
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
}

fn default_tools() -> Vec<String> {
    vec!["mypy".to_string()]
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Baseline store root, relative to the repository root.
    pub baseline_dir: PathBuf,

    /// Where snapshots are created. Defaults to the system temp directory.
    pub snapshot_dir: Option<PathBuf>,

    pub tool_timeout_secs: u64,
    pub checkout_timeout_secs: u64,
    pub refs: RefDefaults,
    pub packages: BTreeMap<String, PackageConfig>,
    pub tools: BTreeMap<String, ToolSettings>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            baseline_dir: PathBuf::from(".baselines"),
            snapshot_dir: None,
            tool_timeout_secs: 600,
            checkout_timeout_secs: 60,
            refs: RefDefaults::default(),
            packages: BTreeMap::new(),
            tools: BTreeMap::new(),
        };
        config.ensure_default_package();
        config
    }
}

impl Config {
    /// Parse configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(text).map_err(|e| BaselineError::Config(e.to_string()))?;
        config.ensure_default_package();
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit configuration file; it must exist.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path).map_err(|e| {
            BaselineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| BaselineError::Config(format!("{}: {e}", path.display())))
    }

    /// Load `explicit`, or `<repo_root>/baseliner.toml` if present, or defaults.
    pub fn discover(repo_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = repo_root.join(CONFIG_FILE);
        if default_path.is_file() {
            Self::load(&default_path)
        } else {
            debug!("no {CONFIG_FILE} found, using defaults");
            Ok(Self::default())
        }
    }

    fn ensure_default_package(&mut self) {
        if self.packages.is_empty() {
            self.packages.insert(
                DEFAULT_PACKAGE.to_string(),
                PackageConfig {
                    path: PathBuf::from("."),
                    tools: default_tools(),
                },
            );
        }
    }

    /// Reject unknown tools, escaping package paths, and zero timeouts.
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 || self.checkout_timeout_secs == 0 {
            return Err(BaselineError::Config("timeouts must be positive".to_string()));
        }
        for id in self.tools.keys() {
            if !KNOWN_TOOLS.contains(&id.as_str()) {
                return Err(BaselineError::Config(format!("unknown tool section '{id}'")));
            }
        }
        for (name, package) in &self.packages {
            if package.tools.is_empty() {
                return Err(BaselineError::Config(format!(
                    "package '{name}' lists no tools"
                )));
            }
            if let Some(id) = package
                .tools
                .iter()
                .find(|t| !KNOWN_TOOLS.contains(&t.as_str()))
            {
                return Err(BaselineError::Config(format!(
                    "package '{name}' uses unknown tool '{id}'"
                )));
            }
            let escapes = package.path.is_absolute()
                || package
                    .path
                    .components()
                    .any(|c| matches!(c, Component::ParentDir));
            if escapes {
                return Err(BaselineError::Config(format!(
                    "package '{name}' path must stay inside the repository: {}",
                    package.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Look up a package by name.
    pub fn package(&self, name: &str) -> Result<&PackageConfig> {
        self.packages.get(name).ok_or_else(|| {
            BaselineError::Config(format!(
                "unknown package '{name}' (configured: {})",
                self.packages.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn tool_settings(&self, id: &str) -> ToolSettings {
        self.tools.get(id).cloned().unwrap_or_default()
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.checkout_timeout_secs)
    }

    /// Snapshot root, falling back to `<tmp>/baseliner-snapshots`.
    pub fn snapshot_root(&self, repo_root: &Path) -> PathBuf {
        match &self.snapshot_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => repo_root.join(dir),
            None => std::env::temp_dir().join("baseliner-snapshots"),
        }
    }

    pub fn baseline_root(&self, repo_root: &Path) -> PathBuf {
        if self.baseline_dir.is_absolute() {
            self.baseline_dir.clone()
        } else {
            repo_root.join(&self.baseline_dir)
        }
    }
}

/// Mode and default reference derived from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnvironment {
    pub mode: Mode,
    pub default_ref: String,
}

impl RunEnvironment {
    /// Detect from the current process environment.
    pub fn detect(config: &Config) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Detect using an arbitrary variable lookup.
    pub fn from_lookup(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let truthy = |key: &str| {
            lookup(key)
                .map(|v| {
                    let v = v.trim().to_ascii_lowercase();
                    !v.is_empty() && v != "0" && v != "false"
                })
                .unwrap_or(false)
        };

        if truthy("CI") || truthy("GITHUB_ACTIONS") {
            let default_ref = lookup("GITHUB_BASE_REF")
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .map(|r| format!("origin/{r}"))
                .unwrap_or_else(|| config.refs.pipeline.clone());
            Self {
                mode: Mode::Pipeline,
                default_ref,
            }
        } else {
            Self {
                mode: Mode::Local,
                default_ref: config.refs.local.clone(),
            }
        }
    }
}
