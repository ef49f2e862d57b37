use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use vtr_task::core::Assets;
use vtr_task::engine::CancelToken;
use vtr_task::storage::ResultTable;
use vtr_task::task_cmd::{self, TaskOptions};

const SLEEPY_SCRIPT: &str = r#"#!/usr/bin/env bash
sleep 1
echo "circuit=$(basename "$1")"
echo "args=${*:3}"
case "$(basename "$1")" in
  bad*) exit 1 ;;
esac
"#;

/// Task that runs `flow.sh` for 2 archs x 4 circuits. The script sleeps one
/// second and fails for circuits named `bad*`.
fn script_task(root: &Path) -> std::path::PathBuf {
    script_task_with(root, SLEEPY_SCRIPT)
}

fn script_task_with(root: &Path, body: &str) -> std::path::PathBuf {
    let dir = root.join("tasks/sleepy");
    let config = dir.join("config");
    fs::create_dir_all(&config).unwrap();
    fs::create_dir_all(root.join("circuits")).unwrap();
    fs::create_dir_all(root.join("archs")).unwrap();

    let circuits = ["c1.blif", "c2.blif", "c3.blif", "bad.blif"];
    for circuit in circuits {
        fs::write(root.join("circuits").join(circuit), ".model c\n.end\n").unwrap();
    }
    for arch in ["a1.xml", "a2.xml"] {
        fs::write(root.join("archs").join(arch), "<architecture/>").unwrap();
    }

    let script = config.join("flow.sh");
    fs::write(&script, body).unwrap();
    let mut perms = fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).unwrap();

    let mut text = format!(
        "circuits_dir={}\narchs_dir={}\nscript_path=flow.sh\nscript_params=--fast\nparse_file=parse.txt\n",
        root.join("circuits").display(),
        root.join("archs").display(),
    );
    for circuit in circuits {
        text.push_str(&format!("circuit_list_add={circuit}\n"));
    }
    text.push_str("arch_list_add=a1.xml\narch_list_add=a2.xml\n");
    fs::write(config.join("config.txt"), text).unwrap();
    fs::write(
        config.join("parse.txt"),
        "circuit;flow.out;circuit=(.*)\nargs;flow.out;args=(.*)\n",
    )
    .unwrap();
    dir
}

#[test]
fn script_triples_run_in_parallel() {
    let tmp = tempdir().unwrap();
    let dir = script_task(tmp.path());

    let started = Instant::now();
    let code = task_cmd::run(
        &TaskOptions {
            tasks: vec![dir.display().to_string()],
            jobs: 4,
            ..Default::default()
        },
        &Assets::new(tmp.path()),
        CancelToken::new(),
    )
    .unwrap();
    let elapsed = started.elapsed();

    // Two arches each have one failing circuit.
    assert_eq!(code, 2);
    // Eight one-second triples on four workers: two rounds plus slack.
    assert!(elapsed.as_secs_f64() < 3.0, "took {elapsed:?}");

    let results = ResultTable::read_tsv(&dir.join("run001/parse_results.txt")).unwrap();
    assert_eq!(results.rows.len(), 8);
    let order: Vec<String> = results.rows.iter().map(|r| r.key.to_string()).collect();
    assert_eq!(order[0], "a1.xml/c1.blif/common");
    assert_eq!(order[3], "a1.xml/bad.blif/common");
    assert_eq!(order[4], "a2.xml/c1.blif/common");
    for row in &results.rows {
        assert_eq!(row.get("circuit"), Some(row.key.circuit.as_str()));
        assert_eq!(row.get("args"), Some("--fast"));
    }

    let bad = fs::read_to_string(dir.join("run001/a2.xml/bad/common/status.txt")).unwrap();
    assert!(bad.contains("failed_step: flow"));
    assert!(bad.contains("error_class: CommandError"));
    let good = fs::read_to_string(dir.join("run001/a2.xml/c3/common/status.txt")).unwrap();
    assert!(good.contains("state: ANALYSED"));
    assert!(!good.contains("failed_step"));
}

#[test]
fn cancelled_run_reports_unstarted_triples() {
    let tmp = tempdir().unwrap();
    let dir = script_task(tmp.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let code = task_cmd::run(
        &TaskOptions {
            tasks: vec![dir.display().to_string()],
            jobs: 2,
            ..Default::default()
        },
        &Assets::new(tmp.path()),
        cancel,
    )
    .unwrap();
    assert_eq!(code, 8);

    // Rows for unstarted triples keep their key with missing values.
    let results = ResultTable::read_tsv(&dir.join("run001/parse_results.txt")).unwrap();
    assert_eq!(results.rows.len(), 8);
    assert!(!dir.join("run001/a1.xml/c1/common/status.txt").exists());
}

#[test]
fn interrupt_stops_running_children() {
    let tmp = tempdir().unwrap();
    let dir = script_task_with(
        tmp.path(),
        "#!/usr/bin/env bash\ntrap 'echo interrupted; exit 130' INT\nsleep 30 &\nwait\n",
    );
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        trigger.cancel();
    });

    let started = Instant::now();
    let code = task_cmd::run(
        &TaskOptions {
            tasks: vec![dir.display().to_string()],
            jobs: 8,
            kill_grace: Duration::from_secs(10),
            ..Default::default()
        },
        &Assets::new(tmp.path()),
        cancel,
    )
    .unwrap();
    interrupter.join().unwrap();

    // Children exit on the interrupt itself, well before the kill grace.
    assert!(started.elapsed() < Duration::from_secs(8), "took {:?}", started.elapsed());
    assert_eq!(code, 8);

    let triple = dir.join("run001/a1.xml/c1/common");
    let status = fs::read_to_string(triple.join("status.txt")).unwrap();
    assert!(status.contains("failed_step: flow"));
    assert!(status.contains("error_class: Cancelled"));
    let log = fs::read_to_string(triple.join("flow.out")).unwrap();
    assert!(log.contains("interrupted"));
}
