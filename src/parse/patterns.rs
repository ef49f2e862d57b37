//! Parse-pattern files: `name;file_glob;regex[;default]` per line.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::{FlowError, FlowResult};

use super::read_with_includes;

#[derive(Debug, Clone)]
pub struct ParsePattern {
    pub name: String,
    /// Glob relative to the triple directory
    pub file_glob: String,
    pub regex: Regex,
    pub default: Option<String>,
}

impl ParsePattern {
    /// First capture of the first line matching this pattern.
    pub fn capture<'t>(&self, line: &'t str) -> Option<&'t str> {
        self.regex
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Load a pattern file, following `%include` lines.
///
/// # Errors
/// `ConfigError` for lines with other than 3 or 4 fields, regexes that do not
/// compile or have no capture group, and duplicate pattern names.
pub fn load_patterns(path: &Path) -> FlowResult<Vec<ParsePattern>> {
    let mut patterns = Vec::new();
    let mut names = HashSet::new();

    for line in read_with_includes(path, "parse")? {
        let err = |message: String| FlowError::config(&line.file, line.line, message);
        let fields: Vec<&str> = line.text.split(';').collect();
        if !(3..=4).contains(&fields.len()) {
            return Err(err(format!(
                "expected name;file_glob;regex[;default], got {} fields",
                fields.len()
            )));
        }

        let name = fields[0].trim();
        if name.is_empty() {
            return Err(err("empty pattern name".into()));
        }
        if !names.insert(name.to_string()) {
            return Err(err(format!("duplicate pattern '{name}'")));
        }

        let regex = Regex::new(fields[2]).map_err(|e| err(format!("pattern '{name}': {e}")))?;
        if regex.captures_len() < 2 {
            return Err(err(format!("pattern '{name}' has no capture group")));
        }

        patterns.push(ParsePattern {
            name: name.to_string(),
            file_glob: fields[1].trim().to_string(),
            regex,
            default: fields.get(3).map(|d| d.trim().to_string()),
        });
    }

    Ok(patterns)
}
