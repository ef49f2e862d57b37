//! Switching-activity estimation with ACE.

use std::path::{Path, PathBuf};

use crate::core::{Asset, FlowStep};
use crate::FlowResult;

use super::blif::{self, LatchTable};
use super::{StepContext, StepOutput, path_arg, require_file, verify_output};

/// Runs ACE on a mapped netlist.
///
/// ACE handles a single clock, which must be named explicitly. It rewrites
/// latch records in its output netlist; the original records are put back
/// afterwards.
#[derive(Debug, Clone, Copy)]
pub struct AceStep {
    pub seed: u32,
}

impl AceStep {
    pub const LOG: &'static str = "ace.out";

    pub fn new(seed: u32) -> Self {
        AceStep { seed }
    }

    /// Activity file produced for `ctx`.
    pub fn activity_file(ctx: &StepContext<'_>) -> PathBuf {
        ctx.artifact(".act")
    }

    pub fn run(&self, ctx: &StepContext<'_>, netlist: &Path) -> FlowResult<StepOutput> {
        require_file(netlist, "netlist")?;
        // Clock problems are reported before ACE is ever spawned.
        let clock = blif::extract_clock(netlist)?;
        let latches = LatchTable::capture(netlist)?;

        let raw = ctx.artifact(".ace.raw.blif");
        let activity = Self::activity_file(ctx);
        let command = vec![
            ctx.exe(Asset::Ace),
            "-b".to_string(),
            path_arg(netlist),
            "-c".to_string(),
            clock,
            "-n".to_string(),
            path_arg(&raw),
            "-o".to_string(),
            path_arg(&activity),
            "-s".to_string(),
            self.seed.to_string(),
        ];
        let outcome = ctx.run(&command, Self::LOG)?;
        verify_output(&activity, FlowStep::Activity)?;
        verify_output(&raw, FlowStep::Activity)?;

        let annotated = ctx.artifact(".ace.blif");
        let restored = latches.apply(&raw, &annotated)?;
        tracing::debug!("restored {restored}/{} latches after ace", latches.len());

        Ok(StepOutput {
            artifact: Some(verify_output(&annotated, FlowStep::Activity)?),
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

    fn setup(netlist_text: &str) -> (tempfile::TempDir, Assets, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("build/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let ace = bin.join("ace");
        // Leaves a marker, then writes the activity file and a netlist that
        // drops the latch type and clock like the real tool does.
        std::fs::write(
            &ace,
            r#"#!/usr/bin/env bash
touch ace_called
echo "$4" > clock_seen
sed 's/^\.latch \([^ ]*\) \([^ ]*\) .* \([0-3]\)$/.latch \1 \2 \3/' "$2" > "$6"
echo "q 0.5 0.2" > "$8"
"#,
        )
        .unwrap();
        let mut perms = std::fs::metadata(&ace).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&ace, perms).unwrap();

        let netlist = tmp.path().join("top.abc.blif");
        std::fs::write(&netlist, netlist_text).unwrap();
        let assets = Assets::new(tmp.path());
        (tmp, assets, netlist)
    }

    #[test]
    fn test_single_clock_runs_ace() {
        let (tmp, assets, netlist) =
            setup(".model top\n.latch d q re clk 0\n.latch e r fe clk 1\n.end\n");
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &assets,
            dir: tmp.path(),
            top: "top",
            indent: 1,
        };

        let out = AceStep::new(1).run(&ctx, &netlist).unwrap();
        assert_eq!(out.artifact, Some(tmp.path().join("top.ace.blif")));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("clock_seen")).unwrap().trim(),
            "clk"
        );

        let annotated = std::fs::read_to_string(tmp.path().join("top.ace.blif")).unwrap();
        assert!(annotated.contains(".latch d q re clk 0"));
        assert!(annotated.contains(".latch e r fe clk 1"));
        assert!(AceStep::activity_file(&ctx).exists());
    }

    #[test]
    fn test_multi_clock_never_spawns_ace() {
        let (tmp, assets, netlist) =
            setup(".model top\n.latch d q re clk_a 0\n.latch e r re clk_b 0\n.end\n");
        let runner = CommandRunner::new();
        let ctx = StepContext {
            runner: &runner,
            assets: &assets,
            dir: tmp.path(),
            top: "top",
            indent: 1,
        };

        let err = AceStep::new(1).run(&ctx, &netlist).unwrap_err();
        assert_eq!(err.to_string(), "unsupported: multi-clock");
        assert!(!tmp.path().join("ace_called").exists());
        assert!(!tmp.path().join(AceStep::LOG).exists());
    }
}
