//! Baseliner Core Library
//!
//! Runs static-analysis tools against two commits in isolated snapshots,
//! stores the reference run as a baseline, and reports only what changed.

pub mod baseline_store;
pub mod checkout;
pub mod compare;
pub mod config;
pub mod domain;
pub mod engine;
pub mod normalize;
pub mod obs;
pub mod report;
pub mod telemetry;
pub mod tool_runner;
pub mod tools;

pub use domain::{
    BaselineError, ComparisonResult, Diagnostic, DiagnosticSet, IdentityKey, IdentityScheme,
    Result, Severity,
};

pub use baseline_store::{BaselineKey, BaselineLoad, BaselineStore, FsBaselineStore};
pub use checkout::{CheckoutManager, Snapshot};
pub use compare::{compare, compare_with};
pub use config::{Config, PackageConfig, RunEnvironment};
pub use engine::{CompareRequest, Engine, EstablishedBaseline};
pub use normalize::normalize;
pub use report::{
    report, report_incomplete, BaseOrigin, Mode, Rendered, Summary, ToolComparison, EXIT_FAILURE,
    EXIT_INVALID, EXIT_OK,
};
pub use tool_runner::{RawOutput, ToolRunner};
pub use tools::{AnalysisTool, ToolSet, ToolSettings};

pub use obs::ComparisonSpan;
pub use telemetry::init_tracing;

/// Baseliner version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
