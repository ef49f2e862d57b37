//! Compare a run's parse results against the task's golden results.

use std::path::PathBuf;

use crate::report::{
    PassRequirements, RegressionReport, compare_tables, render_markdown, render_text,
};
use crate::storage::ResultTable;
use crate::{FlowError, FlowResult};

/// Output format of the printed comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
}

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub golden: PathBuf,
    pub current: PathBuf,
    /// Columns of both tables that are not compared
    pub extra: Vec<String>,
    /// Without a requirements file every golden metric must match exactly
    pub requirements: Option<PathBuf>,
    pub json_out: Option<PathBuf>,
    pub format: ReportFormat,
}

/// Load both tables and the requirements, then compare.
pub fn compare(config: &CompareConfig) -> FlowResult<RegressionReport> {
    let extra: Vec<&str> = config.extra.iter().map(String::as_str).collect();
    let golden = ResultTable::read_tsv_with_extra(&config.golden, &extra)?;
    let current = ResultTable::read_tsv_with_extra(&config.current, &extra)?;
    let requirements = match &config.requirements {
        Some(path) => PassRequirements::load(path)?,
        None => PassRequirements::exact(&golden.metrics),
    };

    Ok(compare_tables(
        &golden,
        &current,
        &requirements,
        config.golden.display().to_string(),
        config.current.display().to_string(),
    ))
}

/// Compare, write the JSON report if requested and print the result.
pub fn run(config: &CompareConfig) -> FlowResult<RegressionReport> {
    let report = compare(config)?;

    if let Some(ref json_path) = config.json_out {
        let json_str = serde_json::to_string_pretty(&report).map_err(|e| {
            FlowError::Message(format!("failed to serialize regression report: {e}"))
        })?;
        std::fs::write(json_path, json_str).map_err(|e| {
            FlowError::Message(format!("failed to write {}: {e}", json_path.display()))
        })?;
        tracing::info!("wrote golden check to {}", json_path.display());
    }

    let output = match config.format {
        ReportFormat::Markdown => render_markdown(&report),
        ReportFormat::Text => render_text(&report),
    };
    print!("{}", output);

    Ok(report)
}
