//! HDL synthesis front-ends.

use std::path::{Path, PathBuf};

use crate::core::{Asset, CircuitKind, FlowParams, FlowStep, HdlParser, SynthTool};
use crate::{FlowError, FlowResult};

use super::arch::ArchInfo;
use super::template::{Placeholder, Substitutions, Template, TemplateKind};
use super::{StepContext, StepOutput, path_arg, require_file, verify_output};

/// Inputs of the synthesis step, all already inside the triple directory.
#[derive(Debug, Clone, Copy)]
pub struct SynthInputs<'a> {
    pub circuit: &'a Path,
    /// Header files read before the circuit
    pub includes: &'a [PathBuf],
    pub arch: &'a Path,
    pub arch_info: ArchInfo,
    pub params: &'a FlowParams,
}

impl SynthInputs<'_> {
    fn check(&self) -> FlowResult<()> {
        require_file(self.circuit, "circuit")?;
        require_file(self.arch, "architecture")?;
        for include in self.includes {
            require_file(include, "include")?;
        }
        Ok(())
    }

    fn substitutions(&self, inputs: String, output: &Path) -> Substitutions {
        Substitutions::new()
            .set(Placeholder::Inputs, inputs)
            .set(Placeholder::Arch, path_arg(self.arch))
            .set(Placeholder::Output, path_arg(output))
            .set(Placeholder::MemAddrWidth, self.arch_info.memory_addr_width)
            .set(Placeholder::MinHardMult, self.params.min_hard_mult_size)
            .set(Placeholder::MinHardAdder, self.params.min_hard_adder_size)
    }

    /// Source files in read order: includes, then the circuit.
    fn sources(&self) -> Vec<String> {
        self.includes
            .iter()
            .map(|p| path_arg(p))
            .chain(std::iter::once(path_arg(self.circuit)))
            .collect()
    }
}

/// A synthesis tool turning HDL into a BLIF netlist.
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesise `inputs.circuit`; the artifact is the produced BLIF.
    fn synthesize(&self, ctx: &StepContext<'_>, inputs: &SynthInputs<'_>) -> FlowResult<StepOutput>;
}

pub fn synthesizer(tool: SynthTool) -> Box<dyn Synthesizer> {
    match tool {
        SynthTool::Odin => Box::new(OdinSynthesizer),
        SynthTool::Parmys => Box::new(ParmysSynthesizer),
    }
}

/// Yosys with the Parmys plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParmysSynthesizer;

impl ParmysSynthesizer {
    pub const SCRIPT: &'static str = "synthesis.tcl";
    pub const LOG: &'static str = "parmys.out";

    /// Yosys commands reading the design for the selected parser.
    fn read_commands(
        &self,
        ctx: &StepContext<'_>,
        inputs: &SynthInputs<'_>,
    ) -> FlowResult<String> {
        let kind = CircuitKind::from_path(inputs.circuit)?;
        if kind == CircuitKind::Json {
            return Ok(format!("read_json {}", path_arg(inputs.circuit)));
        }
        let sources = inputs.sources().join(" ");

        match inputs.params.parser {
            HdlParser::Default => Ok(format!("read_verilog -sv -nolatches {sources}")),
            HdlParser::SystemVerilog => Ok(format!(
                "plugin -i systemverilog\nread_systemverilog -debug {sources}"
            )),
            HdlParser::Surelog => {
                // Surelog elaborates to UHDM first; Yosys reads the database.
                let mut command = vec![
                    ctx.exe(Asset::Surelog),
                    "-parse".to_string(),
                    "-sverilog".to_string(),
                ];
                command.extend(inputs.sources());
                ctx.run(&command, "surelog.out")?;

                let uhdm = ctx.dir.join("slpp_all").join("surelog.uhdm");
                verify_output(&uhdm, FlowStep::Synth)?;
                Ok(format!(
                    "plugin -i systemverilog\nread_uhdm -debug {}",
                    path_arg(&uhdm)
                ))
            }
        }
    }
}

impl Synthesizer for ParmysSynthesizer {
    fn name(&self) -> &'static str {
        "parmys"
    }

    fn synthesize(&self, ctx: &StepContext<'_>, inputs: &SynthInputs<'_>) -> FlowResult<StepOutput> {
        inputs.check()?;
        let template = Template::load_or_builtin(
            TemplateKind::YosysScript,
            &ctx.assets.resolve(Asset::YosysScriptTemplate),
        )?;

        let output = ctx.artifact(".parmys.blif");
        let reads = self.read_commands(ctx, inputs)?;
        let script = ctx.dir.join(Self::SCRIPT);
        template.write(&inputs.substitutions(reads, &output), &script)?;

        let command = vec![
            ctx.exe(Asset::Yosys),
            "-c".to_string(),
            Self::SCRIPT.to_string(),
        ];
        let outcome = ctx.run(&command, Self::LOG)?;

        Ok(StepOutput {
            artifact: Some(verify_output(&output, FlowStep::Synth)?),
            outcome,
        })
    }
}

/// ODIN II.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdinSynthesizer;

impl OdinSynthesizer {
    pub const CONFIG: &'static str = "odin_config.xml";
    pub const LOG: &'static str = "odin.out";
}

impl Synthesizer for OdinSynthesizer {
    fn name(&self) -> &'static str {
        "odin"
    }

    fn synthesize(&self, ctx: &StepContext<'_>, inputs: &SynthInputs<'_>) -> FlowResult<StepOutput> {
        if inputs.params.parser != HdlParser::Default {
            return Err(FlowError::Unsupported(format!(
                "parser '{}' with odin",
                inputs.params.parser.name()
            )));
        }
        if CircuitKind::from_path(inputs.circuit)? == CircuitKind::Json {
            return Err(FlowError::Unsupported("JSON netlist with odin".into()));
        }
        inputs.check()?;

        let template = Template::load_or_builtin(
            TemplateKind::OdinConfig,
            &ctx.assets.resolve(Asset::OdinConfigTemplate),
        )?;
        let output = ctx.artifact(".odin.blif");
        let files = inputs
            .sources()
            .join("</verilog_file>\n        <verilog_file>");
        template.write(
            &inputs.substitutions(files, &output),
            &ctx.dir.join(Self::CONFIG),
        )?;

        let command = vec![ctx.exe(Asset::Odin), "-c".to_string(), Self::CONFIG.to_string()];
        let outcome = ctx.run(&command, Self::LOG)?;

        Ok(StepOutput {
            artifact: Some(verify_output(&output, FlowStep::Synth)?),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Assets;
    use crate::engine::CommandRunner;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tool(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        dir: PathBuf,
        assets: Assets,
        circuit: PathBuf,
        arch: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("vtr");
        let bin = root.join("build/bin");
        std::fs::create_dir_all(&bin).unwrap();
        // Writes the netlist named on the write_blif line of the script.
        fake_tool(
            &bin.join("yosys"),
            r#"out=$(awk '/^write_blif/ {print $NF}' "$2"); echo ".model top" > "$out"; echo "yosys ok""#,
        );
        fake_tool(&bin.join("odin_ii"), "echo called > odin_called");

        let dir = tmp.path().join("triple");
        std::fs::create_dir_all(&dir).unwrap();
        let circuit = dir.join("top.v");
        std::fs::write(&circuit, "module top; endmodule\n").unwrap();
        let arch = dir.join("arch.xml");
        std::fs::write(&arch, "<architecture/>").unwrap();

        Fixture {
            assets: Assets::new(&root),
            _tmp: tmp,
            dir,
            circuit,
            arch,
        }
    }

    #[test]
    fn test_parmys_renders_script_and_runs() {
        let fx = fixture();
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &fx.assets,
            dir: &fx.dir,
            top: "top",
            indent: 1,
        };
        let params = FlowParams::default();
        let inputs = SynthInputs {
            circuit: &fx.circuit,
            includes: &[],
            arch: &fx.arch,
            arch_info: ArchInfo {
                lut_size: 6,
                memory_addr_width: 12,
            },
            params: &params,
        };

        let out = ParmysSynthesizer.synthesize(&ctx, &inputs).unwrap();
        assert_eq!(out.artifact, Some(fx.dir.join("top.parmys.blif")));

        let script = std::fs::read_to_string(fx.dir.join("synthesis.tcl")).unwrap();
        assert!(script.contains(&format!("read_verilog -sv -nolatches {}", fx.circuit.display())));
        assert!(script.contains("scratchpad -set parmys.mem_addr_width 12"));
        assert!(script.contains(&format!("parmys_arch -a {}", fx.arch.display())));

        let log = std::fs::read_to_string(fx.dir.join("parmys.out")).unwrap();
        assert!(log.lines().next().unwrap().ends_with("yosys -c synthesis.tcl"));
    }

    #[test]
    fn test_odin_rejects_other_parsers_before_spawning() {
        let fx = fixture();
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &fx.assets,
            dir: &fx.dir,
            top: "top",
            indent: 1,
        };
        let params = FlowParams {
            parser: HdlParser::Surelog,
            ..FlowParams::default()
        };
        let inputs = SynthInputs {
            circuit: &fx.circuit,
            includes: &[],
            arch: &fx.arch,
            arch_info: ArchInfo::default(),
            params: &params,
        };

        let err = OdinSynthesizer.synthesize(&ctx, &inputs).unwrap_err();
        assert_eq!(err.class(), "Unsupported");
        assert!(!fx.dir.join("odin_called").exists());
    }

    #[test]
    fn test_missing_circuit_spawns_nothing() {
        let fx = fixture();
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &fx.assets,
            dir: &fx.dir,
            top: "top",
            indent: 1,
        };
        let params = FlowParams::default();
        let missing = fx.dir.join("gone.v");
        let inputs = SynthInputs {
            circuit: &missing,
            includes: &[],
            arch: &fx.arch,
            arch_info: ArchInfo::default(),
            params: &params,
        };

        let err = ParmysSynthesizer.synthesize(&ctx, &inputs).unwrap_err();
        assert_eq!(err.class(), "FileMissing");
        assert!(!fx.dir.join("parmys.out").exists());
    }

    #[test]
    fn test_synthesizer_selection() {
        assert_eq!(synthesizer(SynthTool::Odin).name(), "odin");
        assert_eq!(synthesizer(SynthTool::Parmys).name(), "parmys");
    }
}
