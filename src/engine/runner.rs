//! External process runner.
//!
//! Every tool of the flow is launched through [`CommandRunner::run`]: an
//! argument vector (never a shell string), an absolute working directory and a
//! log file inside it. Stdout and stderr are merged into the log, whose first
//! line is the command itself. Stdin is never piped.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::{FlowError, FlowResult};

use super::cancel::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a command that returned the expected code.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub returncode: i32,
    pub log: PathBuf,
    pub elapsed: Duration,
    /// Peak resident memory of the child, when sampled
    pub peak_memory_bytes: Option<u64>,
}

/// Synchronous command runner shared by all flow steps.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Option<Duration>,
    kill_grace: Duration,
    cancel: CancelToken,
}

impl Default for CommandRunner {
    fn default() -> Self {
        CommandRunner {
            timeout: None,
            kill_grace: Duration::from_secs(5),
            cancel: CancelToken::new(),
        }
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every child's wall-clock time.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Time an interrupted child gets before it is killed.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `command` in `working_dir`, logging to `working_dir/log_filename`.
    ///
    /// # Arguments
    /// * `command` - Program followed by its arguments
    /// * `working_dir` - Absolute directory, created if missing
    /// * `log_filename` - Log file name relative to `working_dir`
    /// * `indent_depth` - Nesting level of the echoed command line
    /// * `expected_return_code` - Code the command must exit with
    ///
    /// # Errors
    /// `FileMissing` if the executable does not exist, `CommandError` if the
    /// exit code differs from the expected one, `Timeout` or `Cancelled` if the
    /// child had to be stopped.
    pub fn run(
        &self,
        command: &[String],
        working_dir: &Path,
        log_filename: &str,
        indent_depth: usize,
        expected_return_code: i32,
    ) -> FlowResult<CommandOutcome> {
        let Some(program) = command.first() else {
            return Err(FlowError::invalid_argument("command", ""));
        };
        if !working_dir.is_absolute() {
            return Err(FlowError::invalid_argument(
                "working_dir",
                working_dir.display().to_string(),
            ));
        }
        if program.contains('/') && !Path::new(program).exists() {
            return Err(FlowError::file_missing(program, "executable"));
        }
        if self.cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }

        std::fs::create_dir_all(working_dir)?;
        let log_path = working_dir.join(log_filename);
        let cmd_line = command.join(" ");

        let mut log = File::create(&log_path)?;
        writeln!(log, "{cmd_line}")?;
        log.flush()?;

        tracing::debug!("{}{}", "  ".repeat(indent_depth), cmd_line);

        let mut cmd = Command::new(program);
        cmd.args(&command[1..])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlowError::file_missing(program, "executable"),
            _ => FlowError::Io(e),
        })?;

        let (status, peak_memory_bytes) = self.wait(child, start, command, &log_path)?;
        let elapsed = start.elapsed();
        let returncode = exit_code(status);

        if returncode != expected_return_code {
            return Err(FlowError::Command {
                command: command.to_vec(),
                returncode,
                log: log_path,
            });
        }

        Ok(CommandOutcome {
            returncode,
            log: log_path,
            elapsed,
            peak_memory_bytes,
        })
    }

    /// Poll the child until it exits, enforcing timeout and cancellation.
    fn wait(
        &self,
        mut child: Child,
        start: Instant,
        command: &[String],
        log_path: &Path,
    ) -> FlowResult<(ExitStatus, Option<u64>)> {
        #[cfg(feature = "mem")]
        use sysinfo::{ProcessRefreshKind, RefreshKind, System};

        #[cfg(feature = "mem")]
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
        );
        #[cfg(feature = "mem")]
        let pid = sysinfo::Pid::from_u32(child.id());
        #[cfg(feature = "mem")]
        let mut peak_rss: u64 = 0;

        let mut interrupted_at: Option<Instant> = None;

        loop {
            #[cfg(feature = "mem")]
            {
                if sys.refresh_process(pid) {
                    if let Some(p) = sys.process(pid) {
                        peak_rss = peak_rss.max(p.memory());
                    }
                }
            }

            if let Some(status) = child.try_wait()? {
                if interrupted_at.is_some() {
                    return Err(FlowError::Cancelled);
                }
                #[cfg(feature = "mem")]
                let peak = (peak_rss > 0).then_some(peak_rss);
                #[cfg(not(feature = "mem"))]
                let peak = None;
                return Ok((status, peak));
            }

            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FlowError::Timeout {
                        command: command.to_vec(),
                        seconds: timeout.as_secs(),
                        log: log_path.to_path_buf(),
                    });
                }
            }

            if self.cancel.is_cancelled() {
                match interrupted_at {
                    None => {
                        interrupt(&child);
                        interrupted_at = Some(Instant::now());
                    }
                    Some(at) if at.elapsed() >= self.kill_grace => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(FlowError::Cancelled);
                    }
                    Some(_) => {}
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Exit code, with death-by-signal reported as the negated signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn interrupt(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGINT);
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) {}
