//! Golden-result checking.
//!
//! This module provides:
//! - `PassRequirements`: per-metric tolerances loaded from a task's requirements file
//! - `RegressionReport`: machine-readable comparison of a run against its golden results
//! - Text and Markdown rendering of that report

pub mod pass_requirements;
pub mod regression;

// Re-export key types
pub use pass_requirements::{PassRequirements, Requirement, Verdict};
pub use regression::{
    MetricCheck, RegressionReport, RegressionStatus, ReportMetadata, ReportSummary,
    TripleRegression, compare_tables, render_markdown, render_text,
};
