//! Per-triple metric extraction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::{FlowError, FlowResult};

use super::MISSING_VALUE;
use super::patterns::ParsePattern;

/// Metrics of one triple, in pattern order.
#[derive(Debug, Default)]
pub struct Extraction {
    pub values: IndexMap<String, String>,
    /// `InspectError`s for patterns whose glob did not match exactly one
    /// file; those patterns fell back to their defaults.
    pub diagnostics: Vec<FlowError>,
}

/// Scan the files of `dir` with `patterns`.
///
/// Patterns are grouped by glob so each file is read once. A glob must match
/// exactly one file; otherwise its patterns take their defaults and an
/// `InspectError` is recorded in the diagnostics.
pub fn extract_metrics(dir: &Path, patterns: &[ParsePattern]) -> FlowResult<Extraction> {
    let mut by_glob: IndexMap<&str, Vec<&ParsePattern>> = IndexMap::new();
    for pattern in patterns {
        by_glob.entry(&pattern.file_glob).or_default().push(pattern);
    }

    let mut found: HashMap<&str, String> = HashMap::new();
    let mut diagnostics = Vec::new();

    for (file_glob, group) in by_glob {
        let matches = resolve_glob(dir, file_glob)?;
        if matches.len() != 1 {
            for pattern in &group {
                diagnostics.push(FlowError::Inspect {
                    pattern: pattern.name.clone(),
                    file_glob: file_glob.to_string(),
                    match_count: matches.len(),
                });
            }
            continue;
        }

        let bytes = std::fs::read(&matches[0])?;
        let text = String::from_utf8_lossy(&bytes);
        let mut pending: Vec<&ParsePattern> = group;

        for line in text.lines() {
            if pending.is_empty() {
                break;
            }
            let line = line.trim_start().trim_start_matches('#');
            pending.retain(|pattern| match pattern.capture(line) {
                Some(value) => {
                    found.insert(&pattern.name, value.trim().to_string());
                    false
                }
                None => true,
            });
        }
    }

    let values = patterns
        .iter()
        .map(|p| {
            let value = found
                .remove(p.name.as_str())
                .or_else(|| p.default.clone())
                .unwrap_or_else(|| MISSING_VALUE.to_string());
            (p.name.clone(), value)
        })
        .collect();

    Ok(Extraction {
        values,
        diagnostics,
    })
}

fn resolve_glob(dir: &Path, file_glob: &str) -> FlowResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        file_glob
    );
    let paths = glob::glob(&pattern)
        .map_err(|e| FlowError::invalid_argument("file_glob", format!("{file_glob}: {e}")))?;
    Ok(paths.filter_map(Result::ok).filter(|p| p.is_file()).collect())
}
