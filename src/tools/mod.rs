//! Flow step wrappers, one per external tool.
//!
//! Every wrapper follows the same shape: check its inputs exist, render its
//! script or config from a template, run the tool through the
//! [`CommandRunner`] inside the triple directory, and check that the expected
//! outputs appeared and are non-empty.
//!
//! - [`synth`]: HDL synthesis (Parmys/Yosys or ODIN)
//! - [`abc`]: technology mapping
//! - [`ace`]: switching-activity estimation
//! - [`vpr`]: pack, place, route and timing/power analysis

pub mod abc;
pub mod ace;
pub mod arch;
pub mod blif;
pub mod synth;
pub mod template;
pub mod vpr;

use std::path::{Path, PathBuf};

use crate::core::{Asset, Assets, FlowStep};
use crate::engine::{CommandOutcome, CommandRunner};
use crate::{FlowError, FlowResult};

pub use abc::AbcStep;
pub use ace::AceStep;
pub use arch::ArchInfo;
pub use synth::{OdinSynthesizer, ParmysSynthesizer, SynthInputs, Synthesizer, synthesizer};
pub use vpr::{VprOptions, VprStep};

/// What every wrapper needs to run a tool for one triple.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub runner: &'a CommandRunner,
    pub assets: &'a Assets,
    /// Triple working directory
    pub dir: &'a Path,
    /// Top-level design name used for artifact names
    pub top: &'a str,
    /// Nesting level for echoed commands
    pub indent: usize,
}

impl StepContext<'_> {
    /// Executable path of a tool as a command-vector element.
    pub fn exe(&self, asset: Asset) -> String {
        self.assets.resolve(asset).to_string_lossy().into_owned()
    }

    /// `<dir>/<top><suffix>`
    pub fn artifact(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.top, suffix))
    }

    pub fn run(&self, command: &[String], log_filename: &str) -> FlowResult<CommandOutcome> {
        self.runner
            .run(command, self.dir, log_filename, self.indent, 0)
    }
}

/// Result of one wrapper invocation.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Primary artifact handed to the next step; `None` for analysis
    pub artifact: Option<PathBuf>,
    pub outcome: CommandOutcome,
}

/// Fail with `FileMissing` unless `path` is an existing file.
pub fn require_file(path: &Path, role: &str) -> FlowResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FlowError::file_missing(path, role))
    }
}

/// Check a tool output exists and is non-empty.
pub fn verify_output(path: &Path, step: FlowStep) -> FlowResult<PathBuf> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(path.to_path_buf()),
        _ => Err(FlowError::file_missing(path, format!("output of {step}"))),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_output_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("top.net");
        std::fs::write(&empty, "").unwrap();

        let err = verify_output(&empty, FlowStep::Pack).unwrap_err();
        assert_eq!(err.class(), "FileMissing");
        assert!(err.to_string().contains("output of pack"));

        std::fs::write(&empty, "netlist").unwrap();
        assert_eq!(verify_output(&empty, FlowStep::Pack).unwrap(), empty);
    }

    #[test]
    fn test_require_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_file(dir.path(), "circuit").is_err());
        let file = dir.path().join("a.v");
        std::fs::write(&file, "module a; endmodule").unwrap();
        assert!(require_file(&file, "circuit").is_ok());
    }
}
