//! [`ProcessRunner`]: a one-shot driver for exactly one child process.

use std::io::Write as _;
use std::os::unix::process::CommandExt as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result as AnyResult};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::logger::{Level, Logger};
use crate::output::{accumulate, flush_remaining};
use crate::result::ProcessResult;

const DEFAULT_AGENT_EXECUTABLE: &str = "claude";
const AGENT_EXECUTABLE_ENV_VAR: &str = "CSA_AGENT_EXECUTABLE";
const STDIN_FEED_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const READ_CHUNK_SIZE: usize = 4096;

fn resolve_executable() -> String {
    std::env::var(AGENT_EXECUTABLE_ENV_VAR).unwrap_or_else(|_| DEFAULT_AGENT_EXECUTABLE.to_string())
}

fn build_argv(prompt: &str, model: Option<&str>) -> Vec<String> {
    let mut argv = vec![
        "--print".to_string(),
        "--permission-mode".to_string(),
        "bypassPermissions".to_string(),
        prompt.to_string(),
    ];
    if let Some(model) = model {
        argv.push("--model".to_string());
        argv.push(model.to_string());
    }
    argv
}

/// Options accepted at runner construction beyond the identifying fields.
///
/// Mirrors the options table in the external interfaces surface; grouped
/// into one struct so `Session::create_runner` and direct construction share
/// the same shape.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub model: Option<String>,
    pub stream_output: bool,
    pub timeout_seconds: Option<f64>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self {
            model: None,
            stream_output: true,
            timeout_seconds: None,
        }
    }
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Drives one child process from spawn through reap. Single-shot: a second
/// call to [`ProcessRunner::run`] short-circuits with a synthesized failure
/// rather than spawning twice.
#[derive(Debug)]
pub struct ProcessRunner {
    prompt: String,
    process_id: String,
    working_dir: PathBuf,
    log_dir: PathBuf,
    model: Option<String>,
    stream_output: bool,
    timeout: Option<Duration>,
    ran: AtomicBool,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl ProcessRunner {
    pub fn new(
        prompt: impl Into<String>,
        process_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        config: RunnerConfig,
    ) -> csa_core::Result<Self> {
        let prompt = prompt.into();
        let process_id = process_id.into();
        let working_dir = working_dir.into();
        let log_dir = log_dir.into();

        if prompt.is_empty() {
            return Err(csa_core::CoreError::EmptyPrompt);
        }
        if process_id.is_empty() {
            return Err(csa_core::CoreError::EmptyProcessId);
        }
        if !working_dir.is_dir() {
            return Err(csa_core::CoreError::WorkingDirNotFound(
                working_dir.display().to_string(),
            ));
        }
        std::fs::create_dir_all(&log_dir)?;

        Ok(Self {
            prompt,
            process_id,
            working_dir,
            log_dir,
            model: config.model,
            stream_output: config.stream_output,
            timeout: config.timeout_seconds.map(Duration::from_secs_f64),
            ran: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Clone this runner's configuration with a different prompt and fresh
    /// cancellation state. Used by sequential/batched `pass_output` to
    /// augment a runner before it ever spawns, without a public prompt
    /// setter on the original.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            process_id: self.process_id.clone(),
            working_dir: self.working_dir.clone(),
            log_dir: self.log_dir.clone(),
            model: self.model.clone(),
            stream_output: self.stream_output,
            timeout: self.timeout,
            ran: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    pub fn timeout_seconds(&self) -> Option<f64> {
        self.timeout.map(|d| d.as_secs_f64())
    }

    /// Clone with a timeout applied only if this runner does not already
    /// have one — used by `run_with_fallback`'s `per_runner_timeout`.
    pub fn with_timeout_if_unset(&self, timeout_seconds: f64) -> Self {
        if self.timeout.is_some() {
            return self.with_prompt(self.prompt.clone());
        }
        let mut clone = self.with_prompt(self.prompt.clone());
        clone.timeout = Some(Duration::from_secs_f64(timeout_seconds));
        clone
    }

    /// Idempotent; may be called from another task while `run` is in
    /// flight. Has no effect if the runner has not started or has already
    /// finished.
    pub fn terminate(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    fn log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.process_id))
    }

    pub async fn run(&self) -> ProcessResult {
        if self.ran.swap(true, Ordering::SeqCst) {
            return ProcessResult::synthesized_failure(
                &self.process_id,
                "run() called more than once on this ProcessRunner",
                0.0,
            );
        }

        let spawn_time = Instant::now();
        let logger = match Logger::open(self.log_path(), false) {
            Ok(l) => Some(l),
            Err(e) => {
                warn!(process_id = %self.process_id, error = %e, "failed to open process log; continuing without file logging");
                None
            }
        };

        match self.spawn_child(&logger) {
            Ok((child, feeder)) => self.stream_and_reap(child, feeder, logger, spawn_time).await,
            Err(error) => {
                let message = format!("{error:#}");
                warn!(process_id = %self.process_id, error = %message, "failed to spawn child");
                if let Some(logger) = &logger {
                    logger.log(&message, Level::Error, "runner");
                }
                ProcessResult {
                    process_id: self.process_id.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: message,
                    duration_seconds: spawn_time.elapsed().as_secs_f64(),
                    timed_out: false,
                }
            }
        }
    }

    /// Spawn phase: allocate a pty for stdin, pipe stdout/stderr, isolate the
    /// child in its own process group, and start the stdin feeder thread.
    /// Failures here are caught by `run` and turned into a synthesized
    /// `ProcessResult` rather than propagated, per the surface-don't-propagate
    /// contract — the `anyhow::Result` only carries context up to that point.
    fn spawn_child(
        &self,
        logger: &Option<Logger>,
    ) -> AnyResult<(Child, std::thread::JoinHandle<()>)> {
        let pty = openpty(
            Some(&Winsize {
                ws_row: 50,
                ws_col: 200,
                ws_xpixel: 0,
                ws_ypixel: 0,
            }),
            None,
        )
        .context("failed to allocate pty")?;

        let executable = resolve_executable();
        let argv = build_argv(&self.prompt, self.model.as_deref());

        let mut cmd = Command::new(&executable);
        cmd.args(&argv)
            .current_dir(&self.working_dir)
            .stdin(Stdio::from(std::fs::File::from(pty.slave)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // SAFETY: pre_exec runs in the child after fork, before exec; setsid()
        // is async-signal-safe. Isolating the child in its own process group
        // lets timeout/terminate signal the whole group, not just the leader.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn '{executable}' with args {argv:?}"))?;

        debug!(pid = ?child.id(), argv = ?argv, "spawned child");
        if let Some(logger) = logger {
            logger.log(
                &format!("spawned pid={:?} argv={argv:?}", child.id()),
                Level::Info,
                "runner",
            );
        }

        let feeder = spawn_stdin_feeder(std::fs::File::from(pty.master), self.process_id.clone());
        Ok((child, feeder))
    }

    async fn stream_and_reap(
        &self,
        mut child: Child,
        feeder: std::thread::JoinHandle<()>,
        logger: Option<Logger>,
        spawn_time: Instant,
    ) -> ProcessResult {
        let logger = Arc::new(logger);
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(drain_stream(
            stdout_pipe,
            logger.clone(),
            "[stdout]",
            self.stream_output,
        ));
        let stderr_task = tokio::spawn(drain_stream(
            stderr_pipe,
            logger.clone(),
            "[stderr]",
            self.stream_output,
        ));

        let outcome = wait_for_outcome(&mut child, self.timeout, &self.cancel_notify).await;

        let (exit_code, timed_out, extra_stderr) = match outcome {
            WaitOutcome::Exited(Ok(status)) => (status.code().unwrap_or(-1), false, None),
            WaitOutcome::Exited(Err(e)) => (-1, false, Some(format!("wait failed: {e}"))),
            WaitOutcome::TimedOut => {
                let limit = self.timeout.unwrap_or_default().as_secs_f64();
                warn!(process_id = %self.process_id, timeout_secs = limit, "timed out; terminating child");
                terminate_and_reap(&self.process_id, &mut child).await;
                (
                    -1,
                    true,
                    Some(format!("timed out after {limit}s; process terminated")),
                )
            }
            WaitOutcome::Cancelled => {
                info!(process_id = %self.process_id, "terminate() called; terminating child");
                terminate_and_reap(&self.process_id, &mut child).await;
                (-1, false, Some("terminated by caller".to_string()))
            }
        };

        // Stop and join the stdin feeder; dropping its File closes the pty
        // master, which is what lets it observe the close on its own even if
        // the stop flag race loses.
        let _ = tokio::task::spawn_blocking(move || feeder.join()).await;
        debug!(process_id = %self.process_id, "stdin feeder joined");

        let stdout = stdout_task.await.unwrap_or_default();
        let mut stderr = stderr_task.await.unwrap_or_default();
        debug!(process_id = %self.process_id, "stdout/stderr drain workers joined");
        if let Some(extra) = extra_stderr {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&extra);
            stderr.push('\n');
        }

        info!(process_id = %self.process_id, exit_code, timed_out, "process reaped");
        if let Some(logger) = logger.as_ref() {
            logger.log(
                &format!("exit_code={exit_code} timed_out={timed_out}"),
                Level::Info,
                "runner",
            );
        }

        ProcessResult {
            process_id: self.process_id.clone(),
            exit_code,
            stdout,
            stderr,
            duration_seconds: spawn_time.elapsed().as_secs_f64(),
            timed_out,
        }
    }
}

async fn wait_for_outcome(child: &mut Child, timeout: Option<Duration>, cancel: &Notify) -> WaitOutcome {
    match timeout {
        Some(limit) => {
            tokio::select! {
                res = child.wait() => WaitOutcome::Exited(res),
                _ = tokio::time::sleep(limit) => WaitOutcome::TimedOut,
                _ = cancel.notified() => WaitOutcome::Cancelled,
            }
        }
        None => {
            tokio::select! {
                res = child.wait() => WaitOutcome::Exited(res),
                _ = cancel.notified() => WaitOutcome::Cancelled,
            }
        }
    }
}

/// Polite SIGTERM to the child's process group, a grace period, then
/// SIGKILL if it is still alive. Always reaps before returning.
async fn terminate_and_reap(process_id: &str, child: &mut Child) {
    if let Some(pid) = child.id() {
        debug!(process_id, pid, "sending SIGTERM to process group");
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
        return;
    }
    if let Some(pid) = child.id() {
        warn!(process_id, pid, "grace period elapsed; sending SIGKILL to process group");
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    let _ = child.wait().await;
}

/// Read one pipe to EOF, tagging and logging every complete line and
/// mirroring it to the matching console stream when `stream_output` is set.
/// Returns the fully assembled buffer for the `ProcessResult`.
async fn drain_stream(
    pipe: Option<impl tokio::io::AsyncRead + Unpin>,
    logger: Arc<Option<Logger>>,
    tag: &'static str,
    stream_output: bool,
) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut collected = String::new();
    let mut line_buf = String::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    let on_line = |line: &str, collected: &mut String| {
        collected.push_str(line);
        if let Some(logger) = logger.as_ref() {
            logger.log(line, Level::Info, tag);
        }
        if stream_output {
            match tag {
                "[stdout]" => {
                    print!("{line}");
                    let _ = std::io::stdout().flush();
                }
                _ => eprint!("{line}"),
            }
        }
    };

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => {
                flush_remaining(&mut line_buf, |l| on_line(l, &mut collected));
                break;
            }
            Ok(n) => accumulate(&chunk[..n], &mut line_buf, |l| on_line(l, &mut collected)),
            Err(_) => {
                flush_remaining(&mut line_buf, |l| on_line(l, &mut collected));
                break;
            }
        }
    }
    collected
}

/// Daemon-style loop: every 100ms, while not told to stop, write one
/// newline into the pty master to keep the child's stdin read unblocked.
/// Exits silently on a broken pipe. Owns the master fd outright — dropping
/// the returned `File` on exit is what closes it.
fn spawn_stdin_feeder(master: std::fs::File, process_id: String) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("csa-stdin-feeder-{process_id}"))
        .spawn(move || {
            let mut master = master;
            loop {
                std::thread::sleep(STDIN_FEED_INTERVAL);
                if master.write_all(b"\n").is_err() {
                    break;
                }
            }
        })
        .expect("failed to spawn stdin feeder thread")
}
