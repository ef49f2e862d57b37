//! Result parser: named regex patterns scanned over per-triple log files.

pub mod extract;
pub mod patterns;

use std::path::{Path, PathBuf};

use crate::{FlowError, FlowResult};

pub use extract::{Extraction, extract_metrics};
pub use patterns::{ParsePattern, load_patterns};

/// Value recorded for a metric with no match and no default.
pub const MISSING_VALUE: &str = "-1";

const MAX_INCLUDE_DEPTH: usize = 16;

/// A content line of a pattern or requirements file, with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
}

/// Read a line-oriented file, expanding `%include "other"` lines relative to
/// the including file. Blank lines and `#` comment lines are dropped.
pub fn read_with_includes(path: &Path, role: &str) -> FlowResult<Vec<SourceLine>> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    read_into(path, role, &mut stack, &mut out)?;
    Ok(out)
}

fn read_into(
    path: &Path,
    role: &str,
    stack: &mut Vec<PathBuf>,
    out: &mut Vec<SourceLine>,
) -> FlowResult<()> {
    if stack.iter().any(|p| p == path) || stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(FlowError::config(path, 0, "recursive %include"));
    }
    let text =
        std::fs::read_to_string(path).map_err(|_| FlowError::file_missing(path, role))?;
    stack.push(path.to_path_buf());

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("%include") {
            let name = rest.trim().trim_matches('"');
            if name.is_empty() {
                return Err(FlowError::config(path, idx + 1, "%include without a file"));
            }
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            read_into(&base.join(name), role, stack, out)?;
            continue;
        }
        out.push(SourceLine {
            file: path.to_path_buf(),
            line: idx + 1,
            text: line.to_string(),
        });
    }

    stack.pop();
    Ok(())
}
