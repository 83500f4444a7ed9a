//! Baseliner CLI
//!
//! The `baseliner` command records a reference commit's static-analysis
//! diagnostics and reports only what a change introduces or fixes.
//!
//! ## Commands
//!
//! - `establish-baseline`: Analyze a reference commit and store its diagnostics
//! - `compare`: Compare a head commit against the stored (or recomputed) base
//! - `show-baseline`: Summarize a stored baseline
//! - `clear-baseline`: Remove a stored baseline
//!
//! Exit codes: `0` no new diagnostics, `1` new diagnostics (pipeline mode) or
//! operational error, `2` invalid invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

use baseliner_core::{
    report, report_incomplete, tools, BaselineError, BaselineLoad, CompareRequest, Config, Engine,
    Mode, Rendered, RunEnvironment, ToolSet, EXIT_FAILURE, EXIT_INVALID, EXIT_OK,
};

#[derive(Parser)]
#[command(name = "baseliner")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnostic baseline-and-comparison engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (default: <repo>/baseliner.toml if present)
    #[arg(long, global = true, env = "BASELINER_CONFIG")]
    config: Option<PathBuf>,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a reference commit and store its diagnostics as the baseline
    EstablishBaseline {
        /// Package name from the configuration
        package: String,

        /// Reference commit (default: detected from the environment)
        reference: Option<String>,
    },

    /// Compare a head commit against the baseline of a reference commit
    Compare {
        /// Package name from the configuration
        package: String,

        /// Reference commit (default: detected from the environment)
        #[arg(long)]
        against: Option<String>,

        /// Commit under evaluation
        #[arg(long, default_value = "HEAD")]
        head: String,

        /// Only analyze files changed between the reference and head
        #[arg(long)]
        changed_only: bool,

        /// Analyze the reference commit now instead of loading its baseline
        #[arg(long)]
        recompute_base: bool,

        /// Reporting policy (default: detected from the environment)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Write the JSON summary to this path
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Summarize a stored baseline
    ShowBaseline {
        package: String,
        reference: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove a stored baseline
    ClearBaseline { package: String, reference: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Pipeline,
    Local,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Pipeline => Mode::Pipeline,
            ModeArg::Local => Mode::Local,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    baseliner_core::init_tracing(cli.log_json, level);

    match run(cli).await {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            let invalid = err
                .downcast_ref::<BaselineError>()
                .is_some_and(BaselineError::is_invalid_invocation);
            exit_code(if invalid { EXIT_INVALID } else { EXIT_FAILURE })
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: Cli) -> Result<i32> {
    let repo = cli.repo.canonicalize().map_err(|e| {
        BaselineError::Config(format!(
            "repository path {} is not accessible: {e}",
            cli.repo.display()
        ))
    })?;
    let config = Config::discover(&repo, cli.config.as_deref())?;
    let env = RunEnvironment::detect(&config);

    match cli.command {
        Commands::EstablishBaseline { package, reference } => {
            let reference = reference.unwrap_or_else(|| env.default_ref.clone());
            cmd_establish(&repo, config, &package, &reference).await
        }
        Commands::Compare {
            package,
            against,
            head,
            changed_only,
            recompute_base,
            mode,
            summary_out,
        } => {
            let request = CompareRequest {
                package,
                against: against.unwrap_or_else(|| env.default_ref.clone()),
                head,
                changed_only,
                recompute_base,
            };
            let mode = mode.map(Mode::from).unwrap_or(env.mode);
            cmd_compare(&repo, config, &request, mode, summary_out.as_deref()).await
        }
        Commands::ShowBaseline {
            package,
            reference,
            json,
        } => cmd_show(&repo, config, &package, &reference, json),
        Commands::ClearBaseline { package, reference } => {
            cmd_clear(&repo, config, &package, &reference)
        }
    }
}

/// Resolve every tool the package needs before touching git.
fn resolve_tools(config: &Config, package: &str) -> Result<ToolSet> {
    let pkg = config.package(package)?;
    let set = tools::resolve_all(pkg.tools.iter().map(String::as_str), |id| {
        config.tool_settings(id)
    })?;
    Ok(set)
}

/// Establish a baseline for every tool of a package
async fn cmd_establish(
    repo: &Path,
    config: Config,
    package: &str,
    reference: &str,
) -> Result<i32> {
    let tools = resolve_tools(&config, package)?;
    let engine = Engine::new(repo, config, tools);

    let written = tokio::select! {
        result = engine.establish_baseline(package, reference) => result?,
        _ = tokio::signal::ctrl_c() => {
            return Err(BaselineError::Incomplete(
                "interrupted; no baseline was written".to_string(),
            )
            .into());
        }
    };

    for baseline in &written {
        println!(
            "Established {} at {}: {} diagnostic(s) -> {}",
            baseline.key,
            &baseline.commit[..12.min(baseline.commit.len())],
            baseline.count,
            baseline.path.display()
        );
    }
    Ok(EXIT_OK)
}

/// Compare head against the base and report
async fn cmd_compare(
    repo: &Path,
    config: Config,
    request: &CompareRequest,
    mode: Mode,
    summary_out: Option<&Path>,
) -> Result<i32> {
    let tools = resolve_tools(&config, &request.package)?;
    let engine = Engine::new(repo, config, tools);

    let outcome = tokio::select! {
        result = engine.compare(request) => result,
        _ = tokio::signal::ctrl_c() => Err(BaselineError::Incomplete("interrupted".to_string())),
    };

    let rendered = match outcome {
        Ok(comparisons) => report(&comparisons, mode),
        Err(err) => {
            // A stale summary must never be read as this run's result.
            if let Some(path) = summary_out {
                write_summary(path, &report_incomplete(mode, &err.to_string()))?;
            }
            if let BaselineError::Incomplete(reason) = &err {
                let rendered = report_incomplete(mode, reason);
                print!("{}", rendered.output);
                return Ok(rendered.exit_code);
            }
            return Err(err.into());
        }
    };

    print!("{}", rendered.output);
    if let Some(path) = summary_out {
        write_summary(path, &rendered)?;
    }
    info!(
        exit_code = rendered.exit_code,
        mode = %mode,
        "comparison reported"
    );
    Ok(rendered.exit_code)
}

fn write_summary(path: &Path, rendered: &Rendered) -> Result<()> {
    let body = rendered.summary.to_json_pretty()?;
    std::fs::write(path, body).with_context(|| format!("Failed to write summary to {:?}", path))?;
    Ok(())
}

/// Show per-file counts of a stored baseline
fn cmd_show(
    repo: &Path,
    config: Config,
    package: &str,
    reference: &str,
    json: bool,
) -> Result<i32> {
    let engine = Engine::new(repo, config, ToolSet::new());
    let baselines = engine.show_baseline(package, reference)?;

    if json {
        let entries: Vec<_> = baselines
            .iter()
            .map(|(key, load)| match load {
                BaselineLoad::Missing => json!({
                    "tool": key.tool,
                    "package": key.package,
                    "label": key.label,
                    "present": false,
                }),
                BaselineLoad::Present(set) => json!({
                    "tool": key.tool,
                    "package": key.package,
                    "label": key.label,
                    "present": true,
                    "count": set.len(),
                    "files": per_file_counts(set),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(EXIT_OK);
    }

    for (key, load) in &baselines {
        match load {
            BaselineLoad::Missing => println!("{key}: no baseline"),
            BaselineLoad::Present(set) => {
                println!("{key}: {} diagnostic(s)", set.len());
                for (file, count) in per_file_counts(set) {
                    println!("  {file}: {count}");
                }
            }
        }
    }
    Ok(EXIT_OK)
}

fn per_file_counts(set: &baseliner_core::DiagnosticSet) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for d in set.iter() {
        *counts.entry(d.file.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Remove a stored baseline for every tool of a package
fn cmd_clear(repo: &Path, config: Config, package: &str, reference: &str) -> Result<i32> {
    let engine = Engine::new(repo, config, ToolSet::new());
    for (key, removed) in engine.clear_baseline(package, reference)? {
        if removed {
            println!("Removed baseline {key}");
        } else {
            println!("No baseline for {key}");
        }
    }
    Ok(EXIT_OK)
}
