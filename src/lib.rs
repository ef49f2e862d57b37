pub mod compare_cmd;
pub mod core;
pub mod engine;
pub mod parse;
pub mod report;
pub mod storage;
pub mod task;
pub mod task_cmd;
pub mod tools;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Largest value the process exit code is allowed to reach.
pub const MAX_EXIT_CODE: i32 = 100;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed task config, parse-pattern file, pass-requirements file or
    /// asset table. `line` is 1-based; 0 means the whole file.
    #[error("{}: {message}", location(.file, .line))]
    Config {
        file: PathBuf,
        line: usize,
        message: String,
    },
    #[error("invalid value '{value}' for {name}")]
    InvalidArgument { name: String, value: String },
    #[error("missing {role} file: {}", .path.display())]
    FileMissing { path: PathBuf, role: String },
    #[error("command '{}' returned {returncode} (see {})", .command.join(" "), .log.display())]
    Command {
        command: Vec<String>,
        returncode: i32,
        log: PathBuf,
    },
    #[error("pattern '{pattern}': glob '{file_glob}' matched {match_count} files (expected 1)")]
    Inspect {
        pattern: String,
        file_glob: String,
        match_count: usize,
    },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("could not allocate {resource} after repeated collisions")]
    Race { resource: String },
    #[error("command '{}' timed out after {seconds}s (see {})", .command.join(" "), .log.display())]
    Timeout {
        command: Vec<String>,
        seconds: u64,
        log: PathBuf,
    },
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

pub type FlowResult<T> = Result<T, FlowError>;

fn location(file: &Path, line: &usize) -> String {
    if *line == 0 {
        file.display().to_string()
    } else {
        format!("{}:{}", file.display(), line)
    }
}

impl FlowError {
    pub fn config(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        FlowError::Config {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_argument(name: impl Into<String>, value: impl Into<String>) -> Self {
        FlowError::InvalidArgument {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file_missing(path: impl Into<PathBuf>, role: impl Into<String>) -> Self {
        FlowError::FileMissing {
            path: path.into(),
            role: role.into(),
        }
    }

    /// Stable class name recorded in `status.txt` and failure summaries.
    pub fn class(&self) -> &'static str {
        match self {
            FlowError::Config { .. } => "ConfigError",
            FlowError::InvalidArgument { .. } => "InvalidArgument",
            FlowError::FileMissing { .. } => "FileMissing",
            FlowError::Command { .. } => "CommandError",
            FlowError::Inspect { .. } => "InspectError",
            FlowError::Unsupported(_) => "Unsupported",
            FlowError::Race { .. } => "RaceError",
            FlowError::Timeout { .. } => "Timeout",
            FlowError::Cancelled => "Cancelled",
            FlowError::Io(_) => "IoError",
            FlowError::Message(_) => "Error",
        }
    }
}

/// RFC 3339 timestamp for reports.
pub fn now_string() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
