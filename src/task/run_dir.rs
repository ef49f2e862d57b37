//! Versioned run directories: `run001`, `run002`, ...

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{FlowError, FlowResult};

/// Serialises allocation between threads of this process; `create_dir`
/// atomicity covers other processes.
static ALLOCATION_LOCK: Mutex<()> = Mutex::new(());

const MAX_ATTEMPTS: u32 = 16;

/// Numeric suffix of a `run<NNN>` directory name.
pub fn run_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("run")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn run_name(number: u32) -> String {
    format!("run{number:03}")
}

/// Existing runs of a task, sorted by number.
pub fn existing_runs(task_dir: &Path) -> FlowResult<Vec<(u32, PathBuf)>> {
    let mut runs = Vec::new();
    if !task_dir.is_dir() {
        return Ok(runs);
    }
    for entry in std::fs::read_dir(task_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(run_number) {
            runs.push((n, entry.path()));
        }
    }
    runs.sort();
    Ok(runs)
}

pub fn latest_run_dir(task_dir: &Path) -> FlowResult<Option<PathBuf>> {
    Ok(existing_runs(task_dir)?.pop().map(|(_, path)| path))
}

/// Create the next run directory: largest existing number + 1, `run001` first.
///
/// # Errors
/// `RaceError` if the directory keeps being taken by someone else.
pub fn allocate_next_run(task_dir: &Path) -> FlowResult<PathBuf> {
    let _guard = ALLOCATION_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    std::fs::create_dir_all(task_dir)?;
    let mut next = existing_runs(task_dir)?
        .last()
        .map(|(n, _)| n + 1)
        .unwrap_or(1);

    for _ in 0..MAX_ATTEMPTS {
        let candidate = task_dir.join(run_name(next));
        match std::fs::create_dir(&candidate) {
            Ok(()) => {
                tracing::debug!("allocated {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!("{} already exists, retrying", candidate.display());
                next += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(FlowError::Race {
        resource: format!("run directory in {}", task_dir.display()),
    })
}
