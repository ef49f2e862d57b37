//! Task runner: run the flow for every triple of one or more tasks, parse the
//! results and optionally create or check golden results.
//!
//! Everything a run needs (task configs, parse patterns, pass requirements,
//! golden results) is loaded before the first run directory is allocated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;

use crate::compare_cmd::{self, CompareConfig, ReportFormat};
use crate::core::{Assets, Triple, TripleKey};
use crate::engine::{CancelToken, CommandRunner, TripleFlow, TripleReport, WorkerPool};
use crate::parse::{MISSING_VALUE, ParsePattern, extract_metrics, load_patterns};
use crate::report::PassRequirements;
use crate::storage::{ResultRow, ResultTable};
use crate::task::{Task, allocate_next_run, latest_run_dir, run_dir};
use crate::{FlowError, FlowResult, MAX_EXIT_CODE};

pub const PARSE_RESULTS: &str = "parse_results.txt";
pub const QOR_RESULTS: &str = "qor_results.txt";
pub const GOLDEN_CHECK: &str = "golden_check.json";

/// Options of one `vtr-task` invocation.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Config files, task directories or task names
    pub tasks: Vec<String>,
    pub jobs: usize,
    pub work_dir: Option<PathBuf>,
    pub create_golden: bool,
    pub check_golden: bool,
    pub dry_run: bool,
    pub parse_only: bool,
    pub format: ReportFormat,
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,
    /// Extra `key=value` columns written before the metric columns
    pub extra_columns: Vec<(String, String)>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        TaskOptions {
            tasks: Vec::new(),
            jobs: 1,
            work_dir: None,
            create_golden: false,
            check_golden: false,
            dry_run: false,
            parse_only: false,
            format: ReportFormat::Text,
            timeout: None,
            kill_grace: Duration::from_secs(5),
            extra_columns: Vec::new(),
        }
    }
}

/// A task with everything it needs already loaded and validated.
#[derive(Debug)]
struct LoadedTask {
    task: Task,
    triples: Vec<Triple>,
    patterns: Vec<ParsePattern>,
    qor_patterns: Option<Vec<ParsePattern>>,
}

impl LoadedTask {
    fn load(ident: &str, assets: &Assets, options: &TaskOptions) -> FlowResult<Self> {
        let task = Task::open(ident, assets)?;
        let triples = task.enumerate_triples()?;
        let patterns = load_patterns(&task.parse_file)?;
        let qor_patterns = task
            .qor_parse_file
            .as_deref()
            .map(load_patterns)
            .transpose()?;

        if options.check_golden {
            ResultTable::read_tsv(&task.golden_results())?;
            if let Some(path) = &task.pass_requirements_file {
                PassRequirements::load(path)?;
            }
        }

        Ok(LoadedTask {
            task,
            triples,
            patterns,
            qor_patterns,
        })
    }

    /// Absolute, since every command runs with it as a working-dir prefix.
    fn runs_root(&self, options: &TaskOptions) -> FlowResult<PathBuf> {
        let root = self.task.runs_root(options.work_dir.as_deref());
        Ok(std::path::absolute(root)?)
    }
}

/// Result of one triple job.
#[derive(Debug)]
struct TripleOutcome {
    /// `None` in parse-only mode
    report: Option<TripleReport>,
    metrics: IndexMap<String, String>,
    qor: Option<IndexMap<String, String>>,
}

/// Run the tasks; returns the process exit code.
///
/// The code is the number of failing triples plus failing golden metrics,
/// capped at `MAX_EXIT_CODE`.
pub fn run(options: &TaskOptions, assets: &Assets, cancel: CancelToken) -> FlowResult<i32> {
    if options.tasks.is_empty() {
        return Err(FlowError::invalid_argument("task", "<none>"));
    }
    let loaded = options
        .tasks
        .iter()
        .map(|ident| LoadedTask::load(ident, assets, options))
        .collect::<FlowResult<Vec<_>>>()?;

    if options.dry_run {
        return dry_run(&loaded, options);
    }

    let mut run_dirs = Vec::with_capacity(loaded.len());
    for lt in &loaded {
        let root = lt.runs_root(options)?;
        let dir = if options.parse_only {
            latest_run_dir(&root)?.ok_or_else(|| FlowError::file_missing(&root, "run directory"))?
        } else {
            allocate_next_run(&root)?
        };
        eprintln!("{}: {} triples in {}", lt.task.name, lt.triples.len(), dir.display());
        run_dirs.push(dir);
    }

    let runner = CommandRunner::new()
        .with_timeout(options.timeout)
        .with_kill_grace(options.kill_grace)
        .with_cancel(cancel.clone());
    let pool = WorkerPool::new(options.jobs).with_cancel(cancel);

    // Triples of every task share one pool, emitted task by task.
    let jobs: Vec<(usize, &Triple)> = loaded
        .iter()
        .enumerate()
        .flat_map(|(i, lt)| lt.triples.iter().map(move |t| (i, t)))
        .collect();

    let outcomes = pool.run(&jobs, |(i, triple)| {
        let lt = &loaded[*i];
        let flow = TripleFlow {
            runner: &runner,
            assets,
            task: &lt.task,
            run_dir: &run_dirs[*i],
        };
        run_triple(lt, &flow, triple, options)
    })?;

    let mut failures = 0usize;
    let mut per_task: Vec<Vec<(&Triple, Option<TripleOutcome>)>> =
        loaded.iter().map(|_| Vec::new()).collect();
    for ((i, triple), outcome) in jobs.iter().zip(outcomes) {
        match &outcome {
            None => {
                failures += 1;
                println!("{}: not started (Cancelled)", triple.key());
            }
            Some(TripleOutcome {
                report: Some(report),
                ..
            }) if !report.succeeded() => {
                failures += 1;
                println!(
                    "{}: failed at {} ({})",
                    report.key,
                    report.failed_step.unwrap_or("-"),
                    report.error_class.unwrap_or("Error"),
                );
            }
            _ => {}
        }
        per_task[*i].push((*triple, outcome));
    }

    let mut golden_failures = 0usize;
    for ((lt, run_dir), outcomes) in loaded.iter().zip(&run_dirs).zip(per_task) {
        let results = run_dir.join(PARSE_RESULTS);
        let extra = &options.extra_columns;
        aggregate(&lt.patterns, extra, &outcomes, |o| Some(&o.metrics)).write_all(&results)?;
        if let Some(qor) = &lt.qor_patterns {
            aggregate(qor, extra, &outcomes, |o| o.qor.as_ref())
                .write_all(&run_dir.join(QOR_RESULTS))?;
        }
        tracing::info!("wrote {}", results.display());

        // The check runs against the previous golden results.
        if options.check_golden {
            let report = compare_cmd::run(&CompareConfig {
                golden: lt.task.golden_results(),
                current: results.clone(),
                extra: extra.iter().map(|(k, _)| k.clone()).collect(),
                requirements: lt.task.pass_requirements_file.clone(),
                json_out: Some(run_dir.join(GOLDEN_CHECK)),
                format: options.format,
            })?;
            golden_failures += report.summary.failing_metrics + report.summary.missing_triples;
        }
        if options.create_golden {
            let golden = lt.task.golden_results();
            std::fs::copy(&results, &golden)?;
            eprintln!("{}: created {}", lt.task.name, golden.display());
        }
    }

    let total = failures + golden_failures;
    if failures > 0 {
        eprintln!("{failures} of {} triples failed", jobs.len());
    }
    Ok(total.min(MAX_EXIT_CODE as usize) as i32)
}

/// Run (unless parse-only) and parse one triple.
fn run_triple(
    lt: &LoadedTask,
    flow: &TripleFlow<'_>,
    triple: &Triple,
    options: &TaskOptions,
) -> TripleOutcome {
    let report = (!options.parse_only).then(|| flow.run(triple));
    let dir = triple.dir(flow.run_dir);
    let extra = &options.extra_columns;

    let metrics = parse_triple(&dir, &triple.key(), &lt.patterns, extra, PARSE_RESULTS);
    let qor = lt
        .qor_patterns
        .as_ref()
        .map(|patterns| parse_triple(&dir, &triple.key(), patterns, extra, QOR_RESULTS));

    TripleOutcome {
        report,
        metrics,
        qor,
    }
}

/// Extract the metrics of one triple and write its one-row result table.
fn parse_triple(
    dir: &Path,
    key: &TripleKey,
    patterns: &[ParsePattern],
    extra: &[(String, String)],
    file_name: &str,
) -> IndexMap<String, String> {
    let extraction = match extract_metrics(dir, patterns) {
        Ok(extraction) => extraction,
        Err(err) => {
            tracing::warn!("{key}: parse failed: {err}");
            return default_values(patterns);
        }
    };
    for diagnostic in &extraction.diagnostics {
        tracing::debug!("{key}: {diagnostic}");
    }

    if dir.is_dir() {
        let mut table = result_table(patterns, extra);
        table.push(ResultRow::new(key.clone(), extraction.values.clone()).with_extra(extra_map(extra)));
        if let Err(err) = table.write_tsv(&dir.join(file_name)) {
            tracing::warn!("{key}: could not write {file_name}: {err}");
        }
    }
    extraction.values
}

/// Each pattern's default, or the missing marker where it has none.
fn default_values(patterns: &[ParsePattern]) -> IndexMap<String, String> {
    patterns
        .iter()
        .map(|p| {
            let value = p.default.clone().unwrap_or_else(|| MISSING_VALUE.to_string());
            (p.name.clone(), value)
        })
        .collect()
}

fn result_table(patterns: &[ParsePattern], extra: &[(String, String)]) -> ResultTable {
    ResultTable::new(patterns.iter().map(|p| p.name.clone()).collect())
        .with_extra(extra.iter().map(|(k, _)| k.clone()).collect())
}

fn extra_map(extra: &[(String, String)]) -> IndexMap<String, String> {
    extra.iter().cloned().collect()
}

/// One row per triple in emission order; triples never run get no values.
fn aggregate<'o>(
    patterns: &[ParsePattern],
    extra: &[(String, String)],
    outcomes: &'o [(&Triple, Option<TripleOutcome>)],
    values: impl Fn(&'o TripleOutcome) -> Option<&'o IndexMap<String, String>>,
) -> ResultTable {
    let mut table = result_table(patterns, extra);
    for (triple, outcome) in outcomes {
        let metrics = outcome
            .as_ref()
            .and_then(&values)
            .cloned()
            .unwrap_or_default();
        table.push(ResultRow::new(triple.key(), metrics).with_extra(extra_map(extra)));
    }
    table
}

fn dry_run(loaded: &[LoadedTask], options: &TaskOptions) -> FlowResult<i32> {
    for lt in loaded {
        let root = lt.runs_root(options)?;
        let next = run_dir::existing_runs(&root)?
            .last()
            .map(|(n, _)| n + 1)
            .unwrap_or(1);
        let next_run = root.join(run_dir::run_name(next));
        println!("{} ({} triples)", lt.task.name, lt.triples.len());
        for triple in &lt.triples {
            println!(
                "  {} -> {} [{}]",
                triple.key(),
                triple.dir(&next_run).display(),
                triple.params.args.join(" ")
            );
        }
    }
    Ok(0)
}
