//! [`Session`]: the composition root. Owns one on-disk directory of logs and
//! is the only factory for [`ProcessRunner`] instances in this workspace —
//! runners never reach upward into a global registry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use csa_process::{Level, Logger, ProcessResult, ProcessRunner, RunnerConfig};
use tracing::{debug, info};

use crate::meta::SessionMeta;

/// A named container for one coordinated batch of runner invocations.
#[derive(Debug)]
pub struct Session {
    pattern_name: String,
    session_id: String,
    working_dir: PathBuf,
    session_dir: PathBuf,
    default_model: Option<String>,
    default_stream_output: bool,
    next_process_id: AtomicU64,
    process_ids: Mutex<HashSet<String>>,
    logger: Logger,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        pattern_name: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
        default_model: Option<String>,
        default_stream_output: bool,
    ) -> csa_core::Result<Self> {
        let pattern_name = pattern_name.into();
        if pattern_name.is_empty() {
            return Err(csa_core::CoreError::EmptyPatternName);
        }
        let working_dir = working_dir.into();
        let log_root = log_root.into();

        let session_id = format!("{pattern_name}_{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
        let session_dir = log_root.join(&session_id);
        if session_dir.exists() {
            return Err(csa_core::CoreError::SessionDirExists(
                session_dir.display().to_string(),
            ));
        }
        std::fs::create_dir_all(&session_dir)?;

        let logger = Logger::open(session_dir.join("session.log"), false)?;

        let meta = SessionMeta {
            session_id: session_id.clone(),
            pattern_name: pattern_name.clone(),
            working_dir: working_dir.display().to_string(),
            default_model: default_model.clone(),
            created: Utc::now().to_rfc3339(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| csa_core::CoreError::Io(std::io::Error::other(e)))?;
        std::fs::write(session_dir.join("session.meta"), meta_json)?;

        let session = Self {
            pattern_name,
            session_id,
            working_dir,
            session_dir,
            default_model,
            default_stream_output,
            next_process_id: AtomicU64::new(1),
            process_ids: Mutex::new(HashSet::new()),
            logger,
            closed: AtomicBool::new(false),
        };
        info!(session_id = %session.session_id, working_dir = %session.working_dir.display(), "session created");
        session.logger.log(
            &format!(
                "session '{}' created in {}",
                session.session_id,
                session.working_dir.display()
            ),
            Level::Info,
            "session",
        );
        Ok(session)
    }

    pub fn pattern_name(&self) -> &str {
        &self.pattern_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Build a pre-configured, not-yet-spawned [`ProcessRunner`].
    ///
    /// `process_id` defaults to `proc_<N>` with `N` the next unused integer
    /// starting at 1; a caller-supplied id is rejected if already used in
    /// this session.
    pub fn create_runner(
        &self,
        prompt: impl Into<String>,
        process_id: Option<String>,
        timeout_seconds: Option<f64>,
    ) -> csa_core::Result<ProcessRunner> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(csa_core::CoreError::SessionClosed);
        }

        let process_id = match process_id {
            Some(id) => id,
            None => loop {
                let n = self.next_process_id.fetch_add(1, Ordering::SeqCst);
                let candidate = format!("proc_{n}");
                if !self.process_ids.lock().unwrap_or_else(|p| p.into_inner()).contains(&candidate) {
                    break candidate;
                }
            },
        };

        {
            let mut ids = self.process_ids.lock().unwrap_or_else(|p| p.into_inner());
            if !ids.insert(process_id.clone()) {
                return Err(csa_core::CoreError::DuplicateProcessId(process_id));
            }
        }

        debug!(session_id = %self.session_id, process_id = %process_id, "creating runner");
        let config = RunnerConfig {
            model: self.default_model.clone(),
            stream_output: self.default_stream_output,
            timeout_seconds,
        };
        ProcessRunner::new(
            prompt,
            process_id,
            &self.working_dir,
            &self.session_dir,
            config,
        )
    }

    /// Append a timestamped line to `session.log`.
    pub fn log(&self, message: &str) {
        self.logger.log(message, Level::Info, "session");
    }

    /// Append a textual summary of `results` to `session.log`.
    pub fn summarize(&self, results: &[ProcessResult]) {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let failed = total - succeeded;
        let total_wall_time: f64 = results.iter().map(|r| r.duration_seconds).sum();

        self.logger.log(
            &format!(
                "summary: total={total} succeeded={succeeded} failed={failed} total_wall_time={total_wall_time:.3}s"
            ),
            Level::Info,
            "session",
        );
        for result in results {
            self.logger.log(
                &format!(
                    "  {} exit_code={} timed_out={} duration={:.3}s",
                    result.process_id, result.exit_code, result.timed_out, result.duration_seconds
                ),
                Level::Info,
                "session",
            );
        }
    }

    /// No further runners may be created after this call.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!(session_id = %self.session_id, "session closed");
        self.logger.log(
            &format!("session '{}' closed", self.session_id),
            Level::Info,
            "session",
        );
    }
}
