//! `run_sequential`: strict submission order, optional output passing and
//! stop-on-failure short-circuit.

use csa_process::{ProcessResult, ProcessRunner};
use tracing::debug;

/// Run `runners` one at a time, in order.
///
/// If `pass_output` is true, runner *i* (for *i* > 0) is cloned with the
/// previous runner's stdout prepended to its original prompt, separated by
/// `"\n\n"` — the original prompt is never mutated in place, since
/// `ProcessRunner` exposes no prompt setter; cloning before the augmented
/// run is observationally equivalent because a runner is single-shot.
///
/// If `stop_on_failure` is true and a runner's result has a nonzero exit
/// code, remaining runners are skipped — they are not reaped and do not
/// appear in the returned list.
pub async fn run_sequential(
    runners: Vec<ProcessRunner>,
    pass_output: bool,
    stop_on_failure: bool,
) -> Vec<ProcessResult> {
    let mut results = Vec::with_capacity(runners.len());
    let mut previous_stdout: Option<String> = None;

    for runner in runners {
        let runner = match (&previous_stdout, pass_output) {
            (Some(prev), true) => runner.with_prompt(format!("{prev}\n\n{}", runner.prompt())),
            _ => runner,
        };

        let result = runner.run().await;
        previous_stdout = Some(result.stdout.clone());
        let failed = result.exit_code != 0;
        results.push(result);

        if stop_on_failure && failed {
            debug!(count = results.len(), "stop_on_failure triggered; skipping remaining runners");
            break;
        }
    }

    results
}
