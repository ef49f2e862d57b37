//! Pack, place, route and analysis with VPR.

use std::path::{Path, PathBuf};

use crate::core::{Asset, FlowStep};
use crate::{FlowError, FlowResult};

use super::{StepContext, StepOutput, path_arg, require_file, verify_output};

/// Optional VPR inputs shared by every stage of a triple.
#[derive(Debug, Clone, Default)]
pub struct VprOptions {
    pub sdc_file: Option<PathBuf>,
    pub pad_file: Option<PathBuf>,
    /// CMOS technology properties; enables power analysis
    pub tech_properties: Option<PathBuf>,
    pub activity_file: Option<PathBuf>,
    /// Arguments forwarded verbatim
    pub extra_args: Vec<String>,
}

impl VprOptions {
    fn check(&self) -> FlowResult<()> {
        if let Some(sdc) = &self.sdc_file {
            require_file(sdc, "sdc")?;
        }
        if let Some(pad) = &self.pad_file {
            require_file(pad, "pad")?;
        }
        if let Some(tech) = &self.tech_properties {
            require_file(tech, "cmos tech behavior")?;
            let activity = self
                .activity_file
                .as_deref()
                .ok_or_else(|| FlowError::invalid_argument("activity_file", "<missing>"))?;
            require_file(activity, "activity")?;
        }
        Ok(())
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(sdc) = &self.sdc_file {
            args.extend(["--sdc_file".to_string(), path_arg(sdc)]);
        }
        if let Some(pad) = &self.pad_file {
            args.extend(["--fix_pins".to_string(), path_arg(pad)]);
        }
        if let (Some(tech), Some(activity)) = (&self.tech_properties, &self.activity_file) {
            args.extend([
                "--power".to_string(),
                "--tech_properties".to_string(),
                path_arg(tech),
                "--activity_file".to_string(),
                path_arg(activity),
            ]);
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// One VPR stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VprStep {
    stage: FlowStep,
}

impl VprStep {
    pub const STAGES: [FlowStep; 4] = [
        FlowStep::Pack,
        FlowStep::Place,
        FlowStep::Route,
        FlowStep::Analysis,
    ];

    pub fn new(stage: FlowStep) -> FlowResult<Self> {
        if Self::STAGES.contains(&stage) {
            Ok(VprStep { stage })
        } else {
            Err(FlowError::invalid_argument("vpr stage", stage.id()))
        }
    }

    pub fn stage(&self) -> FlowStep {
        self.stage
    }

    pub fn log_name(&self) -> String {
        format!("vpr.{}.out", self.stage.id())
    }

    fn flag(&self) -> String {
        format!("--{}", self.stage.id())
    }

    /// Artifact this stage must leave behind, if any.
    fn output_suffix(&self) -> Option<&'static str> {
        match self.stage {
            FlowStep::Pack => Some(".net"),
            FlowStep::Place => Some(".place"),
            FlowStep::Route => Some(".route"),
            _ => None,
        }
    }

    pub fn run(
        &self,
        ctx: &StepContext<'_>,
        arch: &Path,
        netlist: &Path,
        options: &VprOptions,
    ) -> FlowResult<StepOutput> {
        require_file(arch, "architecture")?;
        require_file(netlist, "netlist")?;
        options.check()?;
        // Later stages resume from the previous stage's files.
        for earlier in Self::STAGES.iter().take_while(|s| **s < self.stage) {
            if let Some(suffix) = (VprStep { stage: *earlier }).output_suffix() {
                require_file(&ctx.artifact(suffix), &format!("output of {earlier}"))?;
            }
        }

        let mut command = vec![
            ctx.exe(Asset::Vpr),
            path_arg(arch),
            ctx.top.to_string(),
            "--circuit_file".to_string(),
            path_arg(netlist),
        ];
        command.extend(options.args());
        command.push(self.flag());

        let outcome = ctx.run(&command, &self.log_name())?;
        let artifact = match self.output_suffix() {
            Some(suffix) => Some(verify_output(&ctx.artifact(suffix), self.stage)?),
            None => None,
        };
        Ok(StepOutput { artifact, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Assets;
    use crate::engine::CommandRunner;
    use std::os::unix::fs::PermissionsExt;

    fn fake_vpr(root: &Path) {
        let bin = root.join("build/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let vpr = bin.join("vpr");
        std::fs::write(
            &vpr,
            r#"#!/usr/bin/env bash
top="$2"
for last; do :; done
case "$last" in
  --pack) echo net > "$top.net" ;;
  --place) echo place > "$top.place" ;;
  --route) echo route > "$top.route" ;;
esac
echo "args: $*"
"#,
        )
        .unwrap();
        let mut perms = std::fs::metadata(&vpr).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&vpr, perms).unwrap();
    }

    #[test]
    fn test_stages_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        fake_vpr(tmp.path());
        let dir = tmp.path().join("triple");
        std::fs::create_dir_all(&dir).unwrap();
        let arch = dir.join("arch.xml");
        std::fs::write(&arch, "<architecture/>").unwrap();
        let netlist = dir.join("top.abc.blif");
        std::fs::write(&netlist, ".model top\n.end\n").unwrap();

        let assets = Assets::new(tmp.path());
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &assets,
            dir: &dir,
            top: "top",
            indent: 1,
        };
        let options = VprOptions {
            extra_args: vec!["--route_chan_width".into(), "100".into()],
            ..Default::default()
        };

        // Place cannot start before pack has produced the packed netlist.
        let err = VprStep::new(FlowStep::Place)
            .unwrap()
            .run(&ctx, &arch, &netlist, &options)
            .unwrap_err();
        assert_eq!(err.class(), "FileMissing");

        for stage in VprStep::STAGES {
            let out = VprStep::new(stage)
                .unwrap()
                .run(&ctx, &arch, &netlist, &options)
                .unwrap();
            assert_eq!(out.artifact.is_some(), stage != FlowStep::Analysis);
        }

        let log = std::fs::read_to_string(dir.join("vpr.route.out")).unwrap();
        assert!(log.contains("--route_chan_width 100 --route"));
    }

    #[test]
    fn test_power_requires_activity() {
        let options = VprOptions {
            tech_properties: Some(PathBuf::from("/nonexistent/tech.xml")),
            ..Default::default()
        };
        assert_eq!(options.check().unwrap_err().class(), "FileMissing");
        assert!(VprStep::new(FlowStep::Synth).is_err());
    }
}
