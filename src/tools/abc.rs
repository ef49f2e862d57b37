//! Technology mapping with ABC.

use std::path::Path;

use crate::core::{Asset, CircuitKind, FlowStep};
use crate::{FlowError, FlowResult};

use super::blif;
use super::template::{Placeholder, Substitutions, Template, TemplateKind};
use super::{StepContext, StepOutput, path_arg, require_file, verify_output};

/// Maps a netlist onto K-input LUTs.
///
/// BLIF inputs have their latches boxed before ABC runs and restored in the
/// mapped netlist; AIGER inputs go to ABC unchanged.
#[derive(Debug, Clone, Copy)]
pub struct AbcStep {
    pub lut_size: u32,
}

impl AbcStep {
    pub const SCRIPT: &'static str = "abc.script";
    pub const LOG: &'static str = "abc.out";

    pub fn new(lut_size: u32) -> Self {
        AbcStep { lut_size }
    }

    pub fn run(&self, ctx: &StepContext<'_>, netlist: &Path) -> FlowResult<StepOutput> {
        require_file(netlist, "netlist")?;
        if self.lut_size == 0 {
            return Err(FlowError::invalid_argument("lut size", "0"));
        }

        let abc_input = match CircuitKind::from_path(netlist)? {
            CircuitKind::Blif => {
                let boxed = ctx.artifact(".boxed.blif");
                let latches = blif::blackbox_latches(netlist, &boxed)?;
                tracing::debug!("boxed {latches} latches for {}", ctx.top);
                boxed
            }
            CircuitKind::Aig => netlist.to_path_buf(),
            _ => {
                return Err(FlowError::Unsupported(format!(
                    "technology mapping of '{}'",
                    netlist.display()
                )));
            }
        };

        let raw = ctx.artifact(".abc.raw.blif");
        let template = Template::load_or_builtin(
            TemplateKind::AbcScript,
            &ctx.assets.resolve(Asset::AbcScriptTemplate),
        )?;
        template.write(
            &Substitutions::new()
                .set(Placeholder::Inputs, path_arg(&abc_input))
                .set(Placeholder::Output, path_arg(&raw))
                .set(Placeholder::LutSize, self.lut_size),
            &ctx.dir.join(Self::SCRIPT),
        )?;

        let command = vec![ctx.exe(Asset::Abc), "-F".to_string(), Self::SCRIPT.to_string()];
        let outcome = ctx.run(&command, Self::LOG)?;
        verify_output(&raw, FlowStep::Techmap)?;

        let mapped = ctx.artifact(".abc.blif");
        blif::restore_latches(&raw, &mapped)?;

        Ok(StepOutput {
            artifact: Some(verify_output(&mapped, FlowStep::Techmap)?),
            outcome,
        })
    }
}
