//! Orchestration: checkout → run → normalize → store / compare.
//!
//! Runs are sequential. Head-side failures are always fatal. Base-side
//! checkout and tool failures only degrade to an empty base when the base is
//! recomputed from a live checkout; stored-baseline I/O errors stay fatal.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn, Instrument};

use crate::baseline_store::{BaselineKey, BaselineLoad, BaselineStore, FsBaselineStore};
use crate::checkout::{CheckoutManager, Snapshot};
use crate::compare::compare_with;
use crate::config::{Config, PackageConfig};
use crate::domain::{BaselineError, DiagnosticSet, Result};
use crate::normalize::normalize;
use crate::obs::{self, ComparisonSpan};
use crate::report::{BaseOrigin, ToolComparison};
use crate::tool_runner::ToolRunner;
use crate::tools::{AnalysisTool, ToolSet};

/// Inputs of one `compare` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub package: String,
    /// Reference commit (also the stored-baseline label).
    pub against: String,
    pub head: String,
    /// Restrict analysis to files changed between `against` and `head`.
    pub changed_only: bool,
    /// Compute the base from a checkout instead of the baseline store.
    pub recompute_base: bool,
}

impl CompareRequest {
    pub fn new(package: impl Into<String>, against: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            against: against.into(),
            head: "HEAD".to_string(),
            changed_only: false,
            recompute_base: false,
        }
    }
}

/// One baseline written by `establish_baseline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedBaseline {
    pub key: BaselineKey,
    pub commit: String,
    pub path: PathBuf,
    pub count: usize,
}

pub struct Engine {
    config: Config,
    checkouts: CheckoutManager,
    runner: ToolRunner,
    store: Arc<dyn BaselineStore>,
    tools: ToolSet,
}

impl Engine {
    /// Engine backed by the filesystem store configured for `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>, config: Config, tools: ToolSet) -> Self {
        let repo_root = repo_root.into();
        let store = Arc::new(FsBaselineStore::new(config.baseline_root(&repo_root)));
        Self::with_store(repo_root, config, tools, store)
    }

    pub fn with_store(
        repo_root: impl Into<PathBuf>,
        config: Config,
        tools: ToolSet,
        store: Arc<dyn BaselineStore>,
    ) -> Self {
        let repo_root = repo_root.into();
        let checkouts = CheckoutManager::new(&repo_root, config.snapshot_root(&repo_root))
            .with_timeout(config.checkout_timeout());
        let runner = ToolRunner::new(config.tool_timeout());
        Self {
            config,
            checkouts,
            runner,
            store,
            tools,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn checkouts(&self) -> &CheckoutManager {
        &self.checkouts
    }

    fn package_tools(
        &self,
        package: &str,
    ) -> Result<(&PackageConfig, Vec<Arc<dyn AnalysisTool>>)> {
        let pkg = self.config.package(package)?;
        let tools = pkg
            .tools
            .iter()
            .map(|id| {
                self.tools
                    .get(id)
                    .cloned()
                    .ok_or_else(|| BaselineError::ToolNotFound {
                        tool: id.clone(),
                        reason: "not resolved at startup".to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((pkg, tools))
    }

    /// Analyze `reference` and persist one baseline per tool.
    ///
    /// Every failure is fatal, and nothing is saved unless every tool
    /// produced a usable set.
    pub async fn establish_baseline(
        &self,
        package: &str,
        reference: &str,
    ) -> Result<Vec<EstablishedBaseline>> {
        let (pkg, tools) = self.package_tools(package)?;
        let snapshot = self.checkouts.checkout(reference).await?;
        let commit = snapshot.commit().to_string();

        let mut analyzed = Vec::with_capacity(tools.len());
        let mut failure = None;
        for tool in &tools {
            let span = obs::comparison_span(package, tool.id());
            match self
                .analyze(&snapshot, pkg, tool.as_ref(), None)
                .instrument(span)
                .await
            {
                Ok(set) => analyzed.push((tool.id().to_string(), set)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        release(snapshot).await;
        if let Some(e) = failure {
            return Err(e);
        }

        let mut written = Vec::with_capacity(analyzed.len());
        for (tool, set) in analyzed {
            let key = BaselineKey::new(tool, package, reference);
            self.store.save(&set, &key)?;
            info!(key = %key, commit = %commit, count = set.len(), "baseline established");
            written.push(EstablishedBaseline {
                path: self.config.baseline_dir.join(key.relative_path()),
                key,
                commit: commit.clone(),
                count: set.len(),
            });
        }
        Ok(written)
    }

    /// Compare `request.head` against the base for every tool of the package.
    pub async fn compare(&self, request: &CompareRequest) -> Result<Vec<ToolComparison>> {
        let (pkg, tools) = self.package_tools(&request.package)?;

        let (targets, base_failure) = self.changed_scope(request).await?;
        let scope: Option<BTreeSet<&str>> = targets
            .as_ref()
            .map(|files| files.iter().map(String::as_str).collect());

        let bases = match base_failure {
            Some(e) => {
                let origin = degraded_base(&request.against, &e);
                tools.iter().map(|_| origin.clone()).collect()
            }
            None if request.recompute_base => {
                self.recompute_base(request, pkg, &tools, targets.as_deref())
                    .await?
            }
            None => self.load_bases(request, &tools)?,
        };

        let head_snapshot = self.checkouts.checkout(&request.head).await?;
        let mut heads = Vec::with_capacity(tools.len());
        let mut failure = None;
        for tool in &tools {
            let span = obs::comparison_span(&request.package, tool.id());
            match self
                .analyze(&head_snapshot, pkg, tool.as_ref(), targets.as_deref())
                .instrument(span)
                .await
            {
                Ok(set) => heads.push(set),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        release(head_snapshot).await;
        if let Some(e) = failure {
            return Err(e);
        }

        let mut comparisons = Vec::with_capacity(tools.len());
        for ((tool, (origin, base)), head) in tools.iter().zip(bases).zip(heads) {
            let (base, head) = match &scope {
                Some(files) => (restrict(&base, files), restrict(&head, files)),
                None => (base, head),
            };
            let _span = ComparisonSpan::enter(&request.package, tool.id());
            let scheme = tool.identity_scheme();
            let result = compare_with(&base, &head, scheme)?;
            obs::emit_comparison_finished(
                &request.package,
                tool.id(),
                result.new_diagnostics.len(),
                result.fixed_diagnostics.len(),
                result.unchanged_count,
            );
            comparisons.push(ToolComparison {
                package: request.package.clone(),
                tool: tool.id().to_string(),
                scheme,
                base_ref: request.against.clone(),
                head_ref: request.head.clone(),
                base: origin,
                result,
            });
        }
        Ok(comparisons)
    }

    /// Files changed between base and head, when the request asks for it.
    ///
    /// With `recompute_base`, a base ref that cannot be diffed is returned as
    /// a base failure instead of an error, and the run covers the whole tree.
    async fn changed_scope(
        &self,
        request: &CompareRequest,
    ) -> Result<(Option<Vec<String>>, Option<BaselineError>)> {
        if !request.changed_only {
            return Ok((None, None));
        }
        match self
            .checkouts
            .changed_files(&request.against, &request.head)
            .await
        {
            Ok(files) => Ok((Some(files), None)),
            Err(e) if request.recompute_base && e.is_recoverable_for_base() => {
                // An unresolvable head is fatal regardless of the base.
                self.checkouts.resolve(&request.head).await?;
                Ok((None, Some(e)))
            }
            Err(e) => Err(e),
        }
    }

    fn load_bases(
        &self,
        request: &CompareRequest,
        tools: &[Arc<dyn AnalysisTool>],
    ) -> Result<Vec<(BaseOrigin, DiagnosticSet)>> {
        tools
            .iter()
            .map(|tool| {
                let key = BaselineKey::new(tool.id(), &request.package, &request.against);
                Ok(match self.store.load(&key)? {
                    BaselineLoad::Present(set) => (BaseOrigin::Stored, set),
                    BaselineLoad::Missing => {
                        info!(key = %key, "no baseline recorded, treating base as empty");
                        (BaseOrigin::FirstAdoption, DiagnosticSet::empty())
                    }
                })
            })
            .collect()
    }

    async fn recompute_base(
        &self,
        request: &CompareRequest,
        pkg: &PackageConfig,
        tools: &[Arc<dyn AnalysisTool>],
        targets: Option<&[String]>,
    ) -> Result<Vec<(BaseOrigin, DiagnosticSet)>> {
        let degraded = |e: &BaselineError| degraded_base(&request.against, e);

        let snapshot = match self.checkouts.checkout(&request.against).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_recoverable_for_base() => {
                let origin = degraded(&e);
                return Ok(tools.iter().map(|_| origin.clone()).collect());
            }
            Err(e) => return Err(e),
        };
        let commit = snapshot.commit().to_string();

        let mut bases = Vec::with_capacity(tools.len());
        let mut failure = None;
        for tool in tools {
            let span = obs::comparison_span(&request.package, tool.id());
            match self
                .analyze(&snapshot, pkg, tool.as_ref(), targets)
                .instrument(span)
                .await
            {
                Ok(set) => bases.push((
                    BaseOrigin::Recomputed {
                        commit: commit.clone(),
                    },
                    set,
                )),
                Err(e) if e.is_recoverable_for_base() => bases.push(degraded(&e)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        release(snapshot).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(bases),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        pkg: &PackageConfig,
        tool: &dyn AnalysisTool,
        targets: Option<&[String]>,
    ) -> Result<DiagnosticSet> {
        let package_dir = snapshot.path().join(&pkg.path);
        if !package_dir.is_dir() {
            return Err(BaselineError::Checkout {
                reference: snapshot.reference().to_string(),
                path: package_dir,
                reason: "package directory does not exist at this commit".to_string(),
            });
        }
        let raw = self
            .runner
            .run(tool, snapshot.path(), &pkg.path, targets)
            .await?;
        normalize(&raw, tool)
    }

    /// Remove every tool's baseline for `package` at `label`.
    pub fn clear_baseline(&self, package: &str, label: &str) -> Result<Vec<(BaselineKey, bool)>> {
        let pkg = self.config.package(package)?;
        pkg.tools
            .iter()
            .map(|tool| {
                let key = BaselineKey::new(tool, package, label);
                let removed = self.store.clear(&key)?;
                Ok((key, removed))
            })
            .collect()
    }

    /// Load every tool's baseline for `package` at `label`.
    pub fn show_baseline(
        &self,
        package: &str,
        label: &str,
    ) -> Result<Vec<(BaselineKey, BaselineLoad)>> {
        let pkg = self.config.package(package)?;
        pkg.tools
            .iter()
            .map(|tool| {
                let key = BaselineKey::new(tool, package, label);
                let load = self.store.load(&key)?;
                Ok((key, load))
            })
            .collect()
    }
}

/// An empty base standing in for one that could not be computed.
fn degraded_base(against: &str, e: &BaselineError) -> (BaseOrigin, DiagnosticSet) {
    obs::emit_base_degraded(against, e);
    (
        BaseOrigin::Degraded {
            reason: e.to_string(),
        },
        DiagnosticSet::empty(),
    )
}

async fn release(snapshot: Snapshot) {
    let path = snapshot.path().to_path_buf();
    if let Err(e) = snapshot.release().await {
        warn!(path = %path.display(), error = %e, "snapshot release failed");
    }
}

fn restrict(set: &DiagnosticSet, files: &BTreeSet<&str>) -> DiagnosticSet {
    set.iter()
        .filter(|d| files.contains(d.file.as_str()))
        .cloned()
        .collect()
}
