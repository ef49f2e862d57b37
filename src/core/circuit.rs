//! Circuits, flow steps and the (architecture, circuit, parameter-set) triple.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FlowError, FlowResult};

/// Circuit source classified by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitKind {
    /// Verilog / SystemVerilog source (`.v`, `.sv`)
    Hdl,
    /// Verilog header (`.vh`, `.svh`); only valid as an include
    Header,
    /// Pre-synthesised BLIF netlist
    Blif,
    /// AIGER netlist
    Aig,
    /// Yosys JSON netlist
    Json,
}

impl CircuitKind {
    pub fn from_path(path: &Path) -> FlowResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "v" | "sv" => Ok(CircuitKind::Hdl),
            "vh" | "svh" => Ok(CircuitKind::Header),
            "blif" => Ok(CircuitKind::Blif),
            "aig" => Ok(CircuitKind::Aig),
            "json" => Ok(CircuitKind::Json),
            _ => Err(FlowError::Unsupported(format!(
                "circuit format '{}'",
                path.display()
            ))),
        }
    }

    /// Whether the circuit must go through HDL synthesis first.
    pub fn needs_synthesis(&self) -> bool {
        matches!(self, CircuitKind::Hdl | CircuitKind::Json)
    }
}

/// Canonical flow steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStep {
    Synth,
    Techmap,
    Activity,
    Pack,
    Place,
    Route,
    Analysis,
}

impl FlowStep {
    pub const ALL: [FlowStep; 7] = [
        FlowStep::Synth,
        FlowStep::Techmap,
        FlowStep::Activity,
        FlowStep::Pack,
        FlowStep::Place,
        FlowStep::Route,
        FlowStep::Analysis,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            FlowStep::Synth => "synth",
            FlowStep::Techmap => "techmap",
            FlowStep::Activity => "activity",
            FlowStep::Pack => "pack",
            FlowStep::Place => "place",
            FlowStep::Route => "route",
            FlowStep::Analysis => "analysis",
        }
    }

    /// State a triple reaches once this step succeeds.
    pub fn reaches(&self) -> TripleState {
        match self {
            FlowStep::Synth => TripleState::Synthesised,
            FlowStep::Techmap => TripleState::Mapped,
            FlowStep::Activity => TripleState::ActivityAnnotated,
            FlowStep::Pack => TripleState::Packed,
            FlowStep::Place => TripleState::Placed,
            FlowStep::Route => TripleState::Routed,
            FlowStep::Analysis => TripleState::Analysed,
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for FlowStep {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowStep::ALL
            .iter()
            .copied()
            .find(|step| step.id() == s)
            .ok_or_else(|| FlowError::invalid_argument("flow step", s))
    }
}

/// Per-triple progress. Failure is terminal and recorded separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TripleState {
    Prepared,
    Synthesised,
    Mapped,
    ActivityAnnotated,
    Packed,
    Placed,
    Routed,
    Analysed,
}

impl TripleState {
    pub fn label(&self) -> &'static str {
        match self {
            TripleState::Prepared => "PREPARED",
            TripleState::Synthesised => "SYNTHESISED",
            TripleState::Mapped => "MAPPED",
            TripleState::ActivityAnnotated => "ACTIVITY_ANNOTATED",
            TripleState::Packed => "PACKED",
            TripleState::Placed => "PLACED",
            TripleState::Routed => "ROUTED",
            TripleState::Analysed => "ANALYSED",
        }
    }
}

impl fmt::Display for TripleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the parameter sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSet {
    /// Directory name and result-table key (`common`, `common_<entry>`)
    pub label: String,
    /// `script_params` followed by the sweep entry, already tokenised
    pub args: Vec<String>,
}

impl ParamSet {
    /// Build the parameter set for one sweep entry.
    ///
    /// `entry` is `None` when the task has no `script_params_list_add` lines.
    pub fn new(script_params: &[String], entry: Option<&str>) -> FlowResult<Self> {
        let mut args = script_params.to_vec();
        let label = match entry.map(str::trim) {
            None | Some("") => "common".to_string(),
            Some(entry) => {
                let extra = shlex::split(entry).ok_or_else(|| {
                    FlowError::invalid_argument("script_params_list_add", entry)
                })?;
                args.extend(extra);
                format!("common_{}", entry.split_whitespace().collect::<Vec<_>>().join("_"))
            }
        };
        Ok(ParamSet { label, args })
    }
}

/// Row key of every result table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    pub arch: String,
    pub circuit: String,
    pub script_params: String,
}

impl fmt::Display for TripleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.arch, self.circuit, self.script_params)
    }
}

/// One unit of work: an architecture, a circuit and a parameter set.
#[derive(Debug, Clone)]
pub struct Triple {
    /// Architecture entry as written in the task config
    pub arch: String,
    pub arch_path: PathBuf,
    /// Circuit entry as written in the task config
    pub circuit: String,
    pub circuit_path: PathBuf,
    pub params: ParamSet,
}

impl Triple {
    pub fn key(&self) -> TripleKey {
        TripleKey {
            arch: self.arch.clone(),
            circuit: self.circuit.clone(),
            script_params: self.params.label.clone(),
        }
    }

    /// Working directory of this triple inside a run:
    /// `<run>/<arch>/<circuit stem>/<params>`.
    pub fn dir(&self, run_dir: &Path) -> PathBuf {
        run_dir
            .join(&self.arch)
            .join(self.top_name())
            .join(&self.params.label)
    }

    /// Top-level design name, the circuit file stem.
    pub fn top_name(&self) -> String {
        Path::new(&self.circuit)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.circuit.clone())
    }
}
