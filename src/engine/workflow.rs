//! Per-triple flow orchestration.
//!
//! [`TripleFlow::run`] drives one triple through the state machine
//! `PREPARED → SYNTHESISED → MAPPED → ACTIVITY_ANNOTATED (optional) → PACKED →
//! PLACED → ROUTED → ANALYSED`, stopping at the first failing step. Failure is
//! recorded in the triple's `status.txt` and returned in the [`TripleReport`];
//! it never propagates to other triples.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{Assets, CircuitKind, FlowParams, FlowStep, Triple, TripleKey, TripleState};
use crate::task::Task;
use crate::tools::{
    AbcStep, AceStep, ArchInfo, StepContext, StepOutput, SynthInputs, VprOptions, VprStep,
    synthesizer,
};
use crate::{FlowError, FlowResult};

use super::runner::{CommandOutcome, CommandRunner};

pub const STATUS_FILE: &str = "status.txt";
/// Concatenation of the per-stage VPR logs.
pub const VPR_LOG: &str = "vpr.out";
/// Log of an external flow script.
pub const FLOW_LOG: &str = "flow.out";

/// Step name for work that happens before any tool runs.
pub const PREPARE_STEP: &str = "prepare";
/// Step name of an external flow script run.
pub const SCRIPT_STEP: &str = "flow";

/// Timing of one executed step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: &'static str,
    pub elapsed: Duration,
    pub peak_memory_bytes: Option<u64>,
}

/// Outcome of one triple.
#[derive(Debug, Clone)]
pub struct TripleReport {
    pub key: TripleKey,
    pub dir: PathBuf,
    pub state: TripleState,
    pub steps: Vec<StepRecord>,
    pub failed_step: Option<&'static str>,
    pub error_class: Option<&'static str>,
    pub error: Option<String>,
}

impl TripleReport {
    fn new(key: TripleKey, dir: PathBuf) -> Self {
        TripleReport {
            key,
            dir,
            state: TripleState::Prepared,
            steps: Vec::new(),
            failed_step: None,
            error_class: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn record(&mut self, step: &'static str, outcome: &CommandOutcome) {
        self.steps.push(StepRecord {
            step,
            elapsed: outcome.elapsed,
            peak_memory_bytes: outcome.peak_memory_bytes,
        });
    }

    fn fail(&mut self, step: &'static str, err: &FlowError) {
        self.failed_step = Some(step);
        self.error_class = Some(err.class());
        self.error = Some(err.to_string());
    }

    /// Contents of `status.txt`.
    pub fn render_status(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "triple: {}", self.key);
        let _ = writeln!(out, "state: {}", self.state);
        for step in &self.steps {
            let _ = write!(out, "step: {} elapsed_ms={}", step.step, step.elapsed.as_millis());
            if let Some(bytes) = step.peak_memory_bytes {
                let _ = write!(out, " peak_memory_bytes={bytes}");
            }
            out.push('\n');
        }
        if let (Some(step), Some(class), Some(error)) =
            (self.failed_step, self.error_class, &self.error)
        {
            let _ = writeln!(out, "failed_step: {step}");
            let _ = writeln!(out, "error_class: {class}");
            let _ = writeln!(out, "error: {}", error.replace('\n', " "));
        }
        out
    }
}

/// Everything shared by the triples of one run.
#[derive(Debug, Clone, Copy)]
pub struct TripleFlow<'a> {
    pub runner: &'a CommandRunner,
    pub assets: &'a Assets,
    pub task: &'a Task,
    pub run_dir: &'a Path,
}

/// Inputs copied into the triple directory.
struct Staged {
    arch: PathBuf,
    circuit: PathBuf,
    includes: Vec<PathBuf>,
}

impl TripleFlow<'_> {
    /// Run every step of `triple` and write its `status.txt`.
    pub fn run(&self, triple: &Triple) -> TripleReport {
        let dir = triple.dir(self.run_dir);
        let mut report = TripleReport::new(triple.key(), dir.clone());
        tracing::info!("{}: starting", report.key);

        let mut current = PREPARE_STEP;
        if let Err(err) = self.execute(triple, &dir, &mut report, &mut current) {
            tracing::warn!("{}: {current} failed: {err}", report.key);
            report.fail(current, &err);
        } else {
            tracing::info!("{}: {}", report.key, report.state);
        }

        if let Err(err) = std::fs::write(dir.join(STATUS_FILE), report.render_status()) {
            tracing::warn!("{}: could not write {STATUS_FILE}: {err}", report.key);
        }
        report
    }

    fn execute(
        &self,
        triple: &Triple,
        dir: &Path,
        report: &mut TripleReport,
        current: &mut &'static str,
    ) -> FlowResult<()> {
        let staged = self.stage_inputs(triple, dir)?;
        let top = triple.top_name();
        let ctx = StepContext {
            runner: self.runner,
            assets: self.assets,
            dir,
            top: &top,
            indent: 1,
        };

        if let Some(script) = &self.task.script_path {
            *current = SCRIPT_STEP;
            let mut command = vec![
                script.to_string_lossy().into_owned(),
                staged.circuit.to_string_lossy().into_owned(),
                staged.arch.to_string_lossy().into_owned(),
            ];
            command.extend(triple.params.args.iter().cloned());
            let outcome = ctx.run(&command, FLOW_LOG)?;
            report.record(SCRIPT_STEP, &outcome);
            report.state = TripleState::Analysed;
            return Ok(());
        }

        let params = FlowParams::parse(&triple.params.args)?;
        let kind = CircuitKind::from_path(&staged.circuit)?;
        if kind.needs_synthesis() && !params.runs(FlowStep::Synth) {
            return Err(FlowError::invalid_argument(
                "start",
                format!("{} (circuit '{}' needs synthesis)", params.start, triple.circuit),
            ));
        }
        let arch_info = ArchInfo::inspect(&staged.arch)?;
        let mut netlist = staged.circuit.clone();

        let mut advance = |step: FlowStep,
                           current: &mut &'static str,
                           work: &mut dyn FnMut() -> FlowResult<StepOutput>|
         -> FlowResult<Option<PathBuf>> {
            *current = step.id();
            let output = work()?;
            report.record(step.id(), &output.outcome);
            report.state = step.reaches();
            Ok(output.artifact)
        };

        if kind.needs_synthesis() {
            let synth = synthesizer(params.synth_tool);
            let inputs = SynthInputs {
                circuit: &staged.circuit,
                includes: &staged.includes,
                arch: &staged.arch,
                arch_info,
                params: &params,
            };
            if let Some(out) =
                advance(FlowStep::Synth, &mut *current, &mut || synth.synthesize(&ctx, &inputs))?
            {
                netlist = out;
            }
        }

        if params.runs(FlowStep::Techmap) {
            let abc = AbcStep::new(arch_info.lut_size);
            let input = netlist.clone();
            if let Some(out) = advance(FlowStep::Techmap, &mut *current, &mut || abc.run(&ctx, &input))? {
                netlist = out;
            }
        }

        let power = params.power || self.task.cmos_tech_behavior.is_some();
        let mut activity_file = None;
        if power {
            if self.task.cmos_tech_behavior.is_none() {
                *current = FlowStep::Activity.id();
                return Err(FlowError::invalid_argument("cmos_tech_behavior", "<missing>"));
            }
            if params.runs(FlowStep::Activity) {
                let ace = AceStep::new(params.ace_seed);
                let input = netlist.clone();
                if let Some(out) =
                    advance(FlowStep::Activity, &mut *current, &mut || ace.run(&ctx, &input))?
                {
                    netlist = out;
                }
            }
            activity_file = Some(AceStep::activity_file(&ctx));
        }

        let options = VprOptions {
            sdc_file: self
                .task
                .sdc_dir
                .as_ref()
                .map(|d| d.join(format!("{top}.sdc")))
                .filter(|p| p.is_file()),
            pad_file: self.task.pad_file.clone(),
            tech_properties: if power {
                self.task.cmos_tech_behavior.clone()
            } else {
                None
            },
            activity_file,
            extra_args: params.vpr_args.clone(),
        };

        let mut vpr_result = Ok(());
        for stage in VprStep::STAGES.into_iter().filter(|s| params.runs(*s)) {
            let step = VprStep::new(stage)?;
            let input = netlist.clone();
            let staged_arch = staged.arch.clone();
            let result = advance(stage, &mut *current, &mut || {
                step.run(&ctx, &staged_arch, &input, &options)
            });
            if let Err(err) = result {
                vpr_result = Err(err);
                break;
            }
        }
        combine_vpr_logs(dir)?;
        vpr_result
    }

    /// Copy the architecture, circuit and includes into the triple directory.
    fn stage_inputs(&self, triple: &Triple, dir: &Path) -> FlowResult<Staged> {
        std::fs::create_dir_all(dir)?;
        let copy = |src: &Path, role: &str| -> FlowResult<PathBuf> {
            let name = src
                .file_name()
                .ok_or_else(|| FlowError::file_missing(src, role))?;
            let dest = dir.join(name);
            std::fs::copy(src, &dest).map_err(|_| FlowError::file_missing(src, role))?;
            Ok(dest)
        };

        Ok(Staged {
            arch: copy(&triple.arch_path, "architecture")?,
            circuit: copy(&triple.circuit_path, "circuit")?,
            includes: self
                .task
                .includes
                .iter()
                .map(|p| copy(p, "include"))
                .collect::<FlowResult<_>>()?,
        })
    }
}

/// Concatenate the per-stage VPR logs into `vpr.out`, in stage order.
fn combine_vpr_logs(dir: &Path) -> FlowResult<()> {
    let mut combined = Vec::new();
    for stage in VprStep::STAGES {
        let log = dir.join(VprStep::new(stage)?.log_name());
        if let Ok(bytes) = std::fs::read(&log) {
            combined.extend_from_slice(&bytes);
        }
    }
    if !combined.is_empty() {
        std::fs::write(dir.join(VPR_LOG), combined)?;
    }
    Ok(())
}
