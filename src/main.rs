#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use vtr_task::compare_cmd::ReportFormat;
use vtr_task::core::Assets;
use vtr_task::engine::CancelToken;
use vtr_task::task_cmd::{self, TaskOptions};
use vtr_task::MAX_EXIT_CODE;

/// Exit code for command-line and configuration errors.
const USAGE_ERROR: i32 = -1;

#[derive(Parser, Debug)]
#[command(name = "vtr-task", version)]
#[command(about = "Run VTR flow tasks and check their results against golden results", long_about = None)]
struct Cli {
    /// Task config files, task directories or task names under vtr_flow/tasks
    #[arg(required = true)]
    tasks: Vec<String>,

    /// Number of triples run in parallel
    #[arg(short = 'j', default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    jobs: u32,

    /// Verbosity 0-5 (or set VTR_TASK_LOG)
    #[arg(short = 'v', default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=5))]
    verbosity: u8,

    /// Copy this run's parse results to config/golden_results.txt
    #[arg(long = "create_golden")]
    create_golden: bool,

    /// Compare this run's parse results against config/golden_results.txt
    #[arg(long = "check_golden")]
    check_golden: bool,

    /// Create run directories under this path instead of the task directory
    #[arg(long = "work_dir")]
    work_dir: Option<PathBuf>,

    /// Validate the tasks and list their triples without running anything
    #[arg(long = "dry_run")]
    dry_run: bool,

    /// Re-parse the latest run instead of running the flow
    #[arg(long = "parse_only")]
    parse_only: bool,

    /// VTR install root (defaults to $VTR_ROOT, then the current directory)
    #[arg(long = "vtr_root")]
    vtr_root: Option<PathBuf>,

    /// TOML file overriding asset paths
    #[arg(long = "assets")]
    assets: Option<PathBuf>,

    /// Per-command timeout in seconds (0 disables)
    #[arg(long = "timeout", default_value_t = 0)]
    timeout: u64,

    /// Seconds an interrupted command gets before it is killed
    #[arg(long = "kill_grace", default_value_t = 5)]
    kill_grace: u64,

    /// Print the golden check as Markdown
    #[arg(long = "markdown")]
    markdown: bool,

    /// Extra `key=value` column for every parse result row (repeatable)
    #[arg(long = "extra_column", value_parser = parse_key_value)]
    extra_columns: Vec<(String, String)>,
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{arg}'")),
    }
}

fn init_tracing(verbosity: u8) {
    let env = std::env::var("VTR_TASK_LOG").unwrap_or_else(|_| {
        let level = match verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        format!("vtr_task={level}")
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let assets = Assets::load(cli.vtr_root, cli.assets.as_deref()).context("loading assets")?;

    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_sigint_handler() {
        tracing::warn!("could not install SIGINT handler: {e}");
    }

    let options = TaskOptions {
        tasks: cli.tasks,
        jobs: cli.jobs as usize,
        work_dir: cli.work_dir,
        create_golden: cli.create_golden,
        check_golden: cli.check_golden,
        dry_run: cli.dry_run,
        parse_only: cli.parse_only,
        format: if cli.markdown {
            ReportFormat::Markdown
        } else {
            ReportFormat::Text
        },
        timeout: Some(Duration::from_secs(cli.timeout)),
        kill_grace: Duration::from_secs(cli.kill_grace),
        extra_columns: cli.extra_columns,
    };

    let code = task_cmd::run(&options, &assets, cancel)?;
    Ok(code)
}

fn main() {
    color_eyre::install().ok();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { USAGE_ERROR } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_tracing(cli.verbosity);

    let code = match run(cli) {
        Ok(code) => code.min(MAX_EXIT_CODE),
        Err(e) => {
            eprintln!("error: {:#}", e);
            USAGE_ERROR
        }
    };
    std::process::exit(code);
}
