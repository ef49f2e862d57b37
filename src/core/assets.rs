//! Install root → named asset resolver.
//!
//! Every executable, template and data directory the flow needs is looked up
//! through [`Assets::resolve`]. Defaults are laid out relative to the VTR
//! install root; individual entries can be overridden once at startup from a
//! TOML table:
//!
//! ```toml
//! [assets]
//! vpr = "/opt/vtr/bin/vpr"
//! yosys_script = "scripts/synthesis.tcl"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{FlowError, FlowResult};

/// Environment variable naming the VTR install root.
pub const VTR_ROOT_ENV: &str = "VTR_ROOT";

/// Named assets used by the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    Odin,
    Yosys,
    Surelog,
    Abc,
    Ace,
    Vpr,
    OdinConfigTemplate,
    YosysScriptTemplate,
    AbcScriptTemplate,
    FlowRoot,
    TasksDir,
    ParseConfigDir,
    PassRequirementsDir,
}

impl Asset {
    pub const ALL: [Asset; 13] = [
        Asset::Odin,
        Asset::Yosys,
        Asset::Surelog,
        Asset::Abc,
        Asset::Ace,
        Asset::Vpr,
        Asset::OdinConfigTemplate,
        Asset::YosysScriptTemplate,
        Asset::AbcScriptTemplate,
        Asset::FlowRoot,
        Asset::TasksDir,
        Asset::ParseConfigDir,
        Asset::PassRequirementsDir,
    ];

    /// Key used in the override table.
    pub fn key(&self) -> &'static str {
        match self {
            Asset::Odin => "odin",
            Asset::Yosys => "yosys",
            Asset::Surelog => "surelog",
            Asset::Abc => "abc",
            Asset::Ace => "ace",
            Asset::Vpr => "vpr",
            Asset::OdinConfigTemplate => "odin_config",
            Asset::YosysScriptTemplate => "yosys_script",
            Asset::AbcScriptTemplate => "abc_script",
            Asset::FlowRoot => "flow_root",
            Asset::TasksDir => "tasks_dir",
            Asset::ParseConfigDir => "parse_config_dir",
            Asset::PassRequirementsDir => "pass_requirements_dir",
        }
    }

    /// Default location relative to the install root.
    fn default_relative(&self) -> &'static str {
        match self {
            Asset::Odin => "build/bin/odin_ii",
            Asset::Yosys => "build/bin/yosys",
            Asset::Surelog => "build/bin/surelog",
            Asset::Abc => "build/bin/abc",
            Asset::Ace => "build/bin/ace",
            Asset::Vpr => "build/bin/vpr",
            Asset::OdinConfigTemplate => "vtr_flow/misc/basic_odin_config_split.xml",
            Asset::YosysScriptTemplate => "vtr_flow/misc/parmys/synthesis.tcl",
            Asset::AbcScriptTemplate => "vtr_flow/misc/abc/techmap.abc",
            Asset::FlowRoot => "vtr_flow",
            Asset::TasksDir => "vtr_flow/tasks",
            Asset::ParseConfigDir => "vtr_flow/parse/parse_config",
            Asset::PassRequirementsDir => "vtr_flow/parse/pass_requirements",
        }
    }

    fn from_key(key: &str) -> Option<Asset> {
        Asset::ALL.iter().copied().find(|a| a.key() == key)
    }
}

#[derive(Debug, Deserialize)]
struct AssetFile {
    #[serde(default)]
    assets: BTreeMap<String, PathBuf>,
}

/// Resolved asset table.
#[derive(Debug, Clone)]
pub struct Assets {
    root: PathBuf,
    overrides: BTreeMap<&'static str, PathBuf>,
}

impl Assets {
    /// Assets laid out under `root` with no overrides.
    ///
    /// A relative root is anchored at the current directory now, since tools
    /// later run from inside triple directories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Assets {
            root: anchored(root.into()),
            overrides: BTreeMap::new(),
        }
    }

    /// Build the asset table once at startup.
    ///
    /// The root is `vtr_root` if given, else `$VTR_ROOT`, else the current
    /// directory. `overrides`, if given, is a TOML file with an `[assets]` table.
    pub fn load(vtr_root: Option<PathBuf>, overrides: Option<&Path>) -> FlowResult<Self> {
        let root = match vtr_root {
            Some(root) => root,
            None => match std::env::var_os(VTR_ROOT_ENV) {
                Some(root) => PathBuf::from(root),
                None => std::env::current_dir()?,
            },
        };
        let mut assets = Assets::new(root);

        if let Some(path) = overrides {
            let text = std::fs::read_to_string(path)
                .map_err(|_| FlowError::file_missing(path, "asset table"))?;
            let table: AssetFile = toml::from_str(&text)
                .map_err(|e| FlowError::config(path, 0, e.to_string()))?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            for (key, value) in table.assets {
                let asset = Asset::from_key(&key).ok_or_else(|| {
                    FlowError::config(path, 0, format!("unknown asset '{key}'"))
                })?;
                let value = if value.is_absolute() {
                    value
                } else {
                    base.join(value)
                };
                assets.overrides.insert(asset.key(), anchored(value));
            }
        }

        tracing::debug!("install root: {}", assets.root.display());
        Ok(assets)
    }

    /// Override a single asset.
    pub fn with_override(mut self, asset: Asset, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(asset.key(), anchored(path.into()));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a named asset.
    pub fn resolve(&self, asset: Asset) -> PathBuf {
        match self.overrides.get(asset.key()) {
            Some(path) => path.clone(),
            None => self.root.join(asset.default_relative()),
        }
    }

    /// Locate a file named in a task config.
    ///
    /// Absolute paths are returned as-is; relative ones are tried against each
    /// directory of `search` in order, then against the flow root.
    pub fn locate(&self, value: &str, search: &[&Path]) -> Option<PathBuf> {
        let candidate = Path::new(value);
        if candidate.is_absolute() {
            return candidate.exists().then(|| candidate.to_path_buf());
        }
        search
            .iter()
            .map(|dir| dir.join(candidate))
            .chain(std::iter::once(self.resolve(Asset::FlowRoot).join(candidate)))
            .find(|p| p.exists())
    }
}

/// Absolute form of `path`; unchanged if the current directory is unknown.
fn anchored(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}
