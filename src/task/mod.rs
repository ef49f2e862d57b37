//! Task model: a named experiment and its enumerated triples.
//!
//! A task lives in a directory holding `config/config.txt`. Loading resolves
//! every file the config names, so a broken task fails before any run
//! directory is created.

pub mod config;
pub mod run_dir;

use std::path::{Path, PathBuf};

use crate::core::{Asset, Assets, CircuitKind, ParamSet, Triple};
use crate::{FlowError, FlowResult};

pub use config::TaskConfig;
pub use run_dir::{allocate_next_run, latest_run_dir};

pub const CONFIG_DIR: &str = "config";
pub const CONFIG_FILE: &str = "config.txt";
pub const GOLDEN_RESULTS: &str = "golden_results.txt";

/// Find the task directory and config file for a CLI identifier.
///
/// The identifier may be a config file, a task directory, or a task name
/// under the install's tasks directory.
pub fn resolve_task(ident: &str, assets: &Assets) -> FlowResult<(PathBuf, PathBuf)> {
    let path = Path::new(ident);

    if path.is_file() {
        let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let task_dir = if config_dir.file_name().is_some_and(|n| n == CONFIG_DIR) {
            config_dir.parent().unwrap_or(config_dir)
        } else {
            config_dir
        };
        return Ok((absolute(task_dir)?, absolute(path)?));
    }

    let tasks_dir = assets.resolve(Asset::TasksDir);
    for task_dir in [path.to_path_buf(), tasks_dir.join(ident)] {
        let config = task_dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if config.is_file() {
            return Ok((absolute(&task_dir)?, absolute(&config)?));
        }
    }

    Err(FlowError::file_missing(ident, "task"))
}

fn absolute(path: &Path) -> FlowResult<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// A loaded task with every referenced path resolved.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub dir: PathBuf,
    pub config: TaskConfig,
    pub archs: Vec<(String, PathBuf)>,
    pub circuits: Vec<(String, PathBuf)>,
    pub includes: Vec<PathBuf>,
    pub parse_file: PathBuf,
    pub qor_parse_file: Option<PathBuf>,
    pub pass_requirements_file: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub sdc_dir: Option<PathBuf>,
    pub pad_file: Option<PathBuf>,
    pub cmos_tech_behavior: Option<PathBuf>,
}

impl Task {
    /// Load the task identified on the command line.
    pub fn open(ident: &str, assets: &Assets) -> FlowResult<Self> {
        let (dir, config_path) = resolve_task(ident, assets)?;
        Self::load(&dir, &config_path, assets)
    }

    pub fn load(dir: &Path, config_path: &Path, assets: &Assets) -> FlowResult<Self> {
        let config = TaskConfig::load(config_path)?;
        let config_dir = config_path.parent().unwrap_or(dir);
        let local = [config_dir, dir];

        let find = |value: &str, extra: Option<Asset>, role: &str| -> FlowResult<PathBuf> {
            let extra_dir = extra.map(|a| assets.resolve(a));
            let mut search: Vec<&Path> = local.to_vec();
            if let Some(extra_dir) = &extra_dir {
                search.push(extra_dir);
            }
            assets
                .locate(value, &search)
                .ok_or_else(|| FlowError::file_missing(value, role))
        };

        let archs_dir = find(&config.archs_dir, None, "archs_dir")?;
        let circuits_dir = find(&config.circuits_dir, None, "circuits_dir")?;

        let archs = config
            .arch_list_add
            .iter()
            .map(|name| existing(&archs_dir, name, "architecture"))
            .collect::<FlowResult<Vec<_>>>()?;

        let circuits = config
            .circuit_list_add
            .iter()
            .map(|name| {
                let entry = existing(&circuits_dir, name, "circuit")?;
                match CircuitKind::from_path(&entry.1)? {
                    CircuitKind::Header => Err(FlowError::Unsupported(format!(
                        "header '{name}' listed as a circuit"
                    ))),
                    _ => Ok(entry),
                }
            })
            .collect::<FlowResult<Vec<_>>>()?;
        // Triple directories are named by circuit stem.
        let mut stems = std::collections::HashSet::new();
        for (name, path) in &circuits {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            if !stems.insert(stem) {
                return Err(FlowError::config(
                    config_path,
                    0,
                    format!("circuit '{name}' shares its name stem with another circuit"),
                ));
            }
        }

        let includes_dir = match &config.includes_dir {
            Some(value) => find(value, None, "includes_dir")?,
            None => circuits_dir.clone(),
        };
        let includes = config
            .include_list_add
            .iter()
            .map(|name| existing(&includes_dir, name, "include").map(|(_, p)| p))
            .collect::<FlowResult<Vec<_>>>()?;

        let parse_file = find(&config.parse_file, Some(Asset::ParseConfigDir), "parse_file")?;
        let qor_parse_file = config
            .qor_parse_file
            .as_deref()
            .map(|v| find(v, Some(Asset::ParseConfigDir), "qor_parse_file"))
            .transpose()?;
        let pass_requirements_file = config
            .pass_requirements_file
            .as_deref()
            .map(|v| find(v, Some(Asset::PassRequirementsDir), "pass_requirements_file"))
            .transpose()?;
        let script_path = config
            .script_path
            .as_deref()
            .map(|v| find(v, None, "script_path"))
            .transpose()?;
        let sdc_dir = config
            .sdc_dir
            .as_deref()
            .map(|v| find(v, None, "sdc_dir"))
            .transpose()?;
        let pad_file = config
            .pad_file
            .as_deref()
            .map(|v| find(v, None, "pad_file"))
            .transpose()?;
        let cmos_tech_behavior = config
            .cmos_tech_behavior
            .as_deref()
            .map(|v| find(v, None, "cmos_tech_behavior"))
            .transpose()?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        tracing::debug!(
            "task {name}: {} archs, {} circuits, {} parameter sets",
            archs.len(),
            circuits.len(),
            config.sweep().len()
        );

        Ok(Task {
            name,
            dir: dir.to_path_buf(),
            config,
            archs,
            circuits,
            includes,
            parse_file,
            qor_parse_file,
            pass_requirements_file,
            script_path,
            sdc_dir,
            pad_file,
            cmos_tech_behavior,
        })
    }

    /// Every (architecture, circuit, parameter set) combination, architectures
    /// outermost, each list in config order.
    pub fn enumerate_triples(&self) -> FlowResult<Vec<Triple>> {
        let params = self
            .config
            .sweep()
            .into_iter()
            .map(|entry| ParamSet::new(&self.config.script_params, entry))
            .collect::<FlowResult<Vec<_>>>()?;

        let mut triples = Vec::with_capacity(self.archs.len() * self.circuits.len() * params.len());
        for (arch, arch_path) in &self.archs {
            for (circuit, circuit_path) in &self.circuits {
                for param in &params {
                    triples.push(Triple {
                        arch: arch.clone(),
                        arch_path: arch_path.clone(),
                        circuit: circuit.clone(),
                        circuit_path: circuit_path.clone(),
                        params: param.clone(),
                    });
                }
            }
        }
        Ok(triples)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.dir.join(CONFIG_DIR)
    }

    pub fn golden_results(&self) -> PathBuf {
        self.config_dir().join(GOLDEN_RESULTS)
    }

    /// Directory that receives `run<NNN>` directories.
    pub fn runs_root(&self, work_dir: Option<&Path>) -> PathBuf {
        match work_dir {
            Some(work_dir) => work_dir.join(&self.name),
            None => self.dir.clone(),
        }
    }
}

fn existing(dir: &Path, name: &str, role: &str) -> FlowResult<(String, PathBuf)> {
    let path = dir.join(name);
    if path.is_file() {
        Ok((name.to_string(), path))
    } else {
        Err(FlowError::file_missing(path, role))
    }
}
