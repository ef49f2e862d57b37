//! Flow options carried in `script_params` and sweep entries.

use std::str::FromStr;

use crate::core::circuit::FlowStep;
use crate::{FlowError, FlowResult};

/// Synthesis front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthTool {
    Odin,
    #[default]
    Parmys,
}

impl FromStr for SynthTool {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "odin" => Ok(SynthTool::Odin),
            "parmys" | "yosys" => Ok(SynthTool::Parmys),
            other => Err(FlowError::invalid_argument("synth_tool", other)),
        }
    }
}

/// HDL parser back-end used by synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdlParser {
    #[default]
    Default,
    Surelog,
    SystemVerilog,
}

impl HdlParser {
    pub fn name(&self) -> &'static str {
        match self {
            HdlParser::Default => "default",
            HdlParser::Surelog => "surelog",
            HdlParser::SystemVerilog => "system-verilog",
        }
    }
}

impl FromStr for HdlParser {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(HdlParser::Default),
            "surelog" => Ok(HdlParser::Surelog),
            "system-verilog" => Ok(HdlParser::SystemVerilog),
            other => Err(FlowError::invalid_argument("parser", other)),
        }
    }
}

/// Parsed flow options for one triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowParams {
    pub start: FlowStep,
    pub end: FlowStep,
    pub synth_tool: SynthTool,
    pub parser: HdlParser,
    pub power: bool,
    pub min_hard_mult_size: u32,
    pub min_hard_adder_size: u32,
    pub ace_seed: u32,
    /// Everything not recognised here, forwarded to VPR as-is
    pub vpr_args: Vec<String>,
}

impl Default for FlowParams {
    fn default() -> Self {
        FlowParams {
            start: FlowStep::Synth,
            end: FlowStep::Analysis,
            synth_tool: SynthTool::default(),
            parser: HdlParser::default(),
            power: false,
            min_hard_mult_size: 3,
            min_hard_adder_size: 1,
            ace_seed: 1,
            vpr_args: Vec::new(),
        }
    }
}

impl FlowParams {
    pub fn parse(args: &[String]) -> FlowResult<Self> {
        let mut params = FlowParams::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| FlowError::invalid_argument(name, "<missing>"))
            };
            match arg.as_str() {
                "-start" => params.start = stage(&value("start")?, false)?,
                "-end" => params.end = stage(&value("end")?, true)?,
                "-synth_tool" => params.synth_tool = value("synth_tool")?.parse()?,
                "-parser" => params.parser = value("parser")?.parse()?,
                "-power" => params.power = true,
                "-min_hard_mult_size" => {
                    params.min_hard_mult_size =
                        number("min_hard_mult_size", &value("min_hard_mult_size")?)?
                }
                "-min_hard_adder_size" => {
                    params.min_hard_adder_size =
                        number("min_hard_adder_size", &value("min_hard_adder_size")?)?
                }
                "-ace_seed" => params.ace_seed = number("ace_seed", &value("ace_seed")?)?,
                _ => params.vpr_args.push(arg.clone()),
            }
        }

        if params.start > params.end {
            return Err(FlowError::invalid_argument(
                "start/end",
                format!("{} after {}", params.start, params.end),
            ));
        }
        Ok(params)
    }

    /// Whether `step` lies inside the `-start`/`-end` window.
    pub fn runs(&self, step: FlowStep) -> bool {
        self.start <= step && step <= self.end
    }
}

/// Stage names accepted by `-start` / `-end`; tool names map to the steps they run.
fn stage(name: &str, end: bool) -> FlowResult<FlowStep> {
    match name {
        "odin" | "parmys" | "yosys" => Ok(FlowStep::Synth),
        "abc" => Ok(FlowStep::Techmap),
        "ace" => Ok(FlowStep::Activity),
        "vpr" if end => Ok(FlowStep::Analysis),
        "vpr" => Ok(FlowStep::Pack),
        other => other.parse(),
    }
}

fn number(name: &str, value: &str) -> FlowResult<u32> {
    value
        .parse()
        .map_err(|_| FlowError::invalid_argument(name, value))
}
