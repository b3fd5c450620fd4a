//! The immutable outcome of one runner.

/// Outcome of a single child-process run.
///
/// Two construction paths: [`ProcessResult::from_run`] populates every field
/// from an actual spawn/wait cycle; [`ProcessResult::synthesized_failure`] is
/// used by strategies when a runner could not be driven at all (empty
/// fallback input, a runner skipped before it ever spawned).
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub process_id: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub timed_out: bool,
}

impl ProcessResult {
    /// Build a failure result that did not come from an actual run — used by
    /// strategies (empty fallback input) and by the runner itself when spawn
    /// fails before any process exists.
    pub fn synthesized_failure(
        process_id: impl Into<String>,
        stderr: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            exit_code: -1,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_seconds,
            timed_out: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
