//! Task config loader.
//!
//! The format is one `key=value` per line. Text after `#` is a comment.
//! Unique keys may appear once; list keys may repeat and keep their order.

use std::path::{Path, PathBuf};

use crate::{FlowError, FlowResult};

const REQUIRED: &[&str] = &[
    "circuits_dir",
    "archs_dir",
    "circuit_list_add",
    "arch_list_add",
    "parse_file",
];

/// Parsed `config.txt`, values still as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    pub path: PathBuf,
    pub circuits_dir: String,
    pub archs_dir: String,
    pub parse_file: String,
    pub script_path: Option<String>,
    pub script_params: Vec<String>,
    pub pass_requirements_file: Option<String>,
    pub sdc_dir: Option<String>,
    pub qor_parse_file: Option<String>,
    pub cmos_tech_behavior: Option<String>,
    pub pad_file: Option<String>,
    pub includes_dir: Option<String>,
    pub circuit_list_add: Vec<String>,
    pub arch_list_add: Vec<String>,
    pub script_params_list_add: Vec<String>,
    pub include_list_add: Vec<String>,
}

impl TaskConfig {
    /// Load and validate a task config file.
    ///
    /// # Errors
    /// `FileMissing` if the file cannot be read; `ConfigError` with the
    /// offending line for malformed, unknown or duplicate keys, and with line 0
    /// for missing required keys.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| FlowError::file_missing(path, "task config"))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> FlowResult<Self> {
        let mut config = TaskConfig {
            path: path.to_path_buf(),
            ..Default::default()
        };
        let mut seen: Vec<String> = Vec::new();
        let mut script_params: Option<String> = None;
        let mut circuits_dir = None;
        let mut archs_dir = None;
        let mut parse_file = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |message: String| FlowError::config(path, line_no, message);

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| err(format!("expected key=value, got '{line}'")))?;
            let (key, value) = (key.trim(), value.trim().to_string());

            let list = match key {
                "circuit_list_add" => Some(&mut config.circuit_list_add),
                "arch_list_add" => Some(&mut config.arch_list_add),
                "script_params_list_add" => Some(&mut config.script_params_list_add),
                "include_list_add" => Some(&mut config.include_list_add),
                _ => None,
            };
            if let Some(list) = list {
                if value.is_empty() && key != "script_params_list_add" {
                    return Err(err(format!("empty value for '{key}'")));
                }
                if list.contains(&value) {
                    return Err(err(format!("duplicate entry '{value}' for '{key}'")));
                }
                list.push(value);
                seen.push(key.to_string());
                continue;
            }

            let slot = match key {
                "circuits_dir" => &mut circuits_dir,
                "archs_dir" => &mut archs_dir,
                "parse_file" => &mut parse_file,
                "script_path" => &mut config.script_path,
                "script_params" => &mut script_params,
                "pass_requirements_file" => &mut config.pass_requirements_file,
                "sdc_dir" => &mut config.sdc_dir,
                "qor_parse_file" => &mut config.qor_parse_file,
                "cmos_tech_behavior" => &mut config.cmos_tech_behavior,
                "pad_file" => &mut config.pad_file,
                "includes_dir" => &mut config.includes_dir,
                other => return Err(err(format!("unknown key '{other}'"))),
            };
            if slot.is_some() {
                return Err(err(format!("duplicate key '{key}'")));
            }
            if value.is_empty() && key != "script_params" {
                return Err(err(format!("empty value for '{key}'")));
            }
            *slot = Some(value);
            seen.push(key.to_string());
        }

        if let Some(missing) = REQUIRED.iter().find(|k| !seen.iter().any(|s| s == **k)) {
            return Err(FlowError::config(
                path,
                0,
                format!("missing required key '{missing}'"),
            ));
        }

        config.circuits_dir = circuits_dir.unwrap_or_default();
        config.archs_dir = archs_dir.unwrap_or_default();
        config.parse_file = parse_file.unwrap_or_default();
        if let Some(params) = script_params {
            config.script_params = shlex::split(&params).ok_or_else(|| {
                FlowError::config(path, 0, format!("unbalanced quotes in script_params '{params}'"))
            })?;
        }
        Ok(config)
    }

    /// Sweep entries; a single empty entry when the task has none.
    pub fn sweep(&self) -> Vec<Option<&str>> {
        if self.script_params_list_add.is_empty() {
            vec![None]
        } else {
            self.script_params_list_add
                .iter()
                .map(|s| Some(s.as_str()))
                .collect()
        }
    }
}
