//! `run_with_fallback`: try runners in order, stop at the first success.

use csa_process::{ProcessResult, ProcessRunner};
use tracing::{debug, warn};

/// Try each runner in order until one succeeds (`exit_code == 0`), returning
/// its result immediately without starting the remaining runners. If none
/// succeed, returns the last runner's result. An empty `runners` list
/// synthesizes a failure rather than panicking, since there is no result to
/// return.
///
/// `per_runner_timeout`, when set, is applied to any runner that was built
/// without its own timeout (`ProcessRunner::with_timeout_if_unset`) — a
/// runner constructed with an explicit timeout keeps it.
pub async fn run_with_fallback(
    runners: Vec<ProcessRunner>,
    per_runner_timeout: Option<f64>,
) -> ProcessResult {
    if runners.is_empty() {
        warn!("run_with_fallback called with no runners");
        return ProcessResult::synthesized_failure(
            "fallback",
            "no runners supplied to run_with_fallback",
            0.0,
        );
    }

    let mut last = None;
    for runner in runners {
        let runner = match per_runner_timeout {
            Some(timeout) => runner.with_timeout_if_unset(timeout),
            None => runner,
        };

        let process_id = runner.process_id().to_string();
        let result = runner.run().await;
        if result.succeeded() {
            debug!(process_id = %process_id, "fallback succeeded; skipping remaining runners");
            return result;
        }
        last = Some(result);
    }

    last.expect("loop runs at least once for a non-empty runners list")
}
