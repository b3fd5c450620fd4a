//! `run_batched`: fixed-size contiguous chunks, each run via [`run_parallel`].

use csa_core::CoreError;
use csa_process::{ProcessResult, ProcessRunner};
use tracing::debug;

use crate::parallel::run_parallel;

/// Partition `runners` into contiguous chunks of `batch_size` (the last
/// chunk may be shorter) and run each chunk via [`run_parallel`] with
/// `max_workers = batch_size`, one chunk after another.
///
/// If `pass_output` is true, the successful stdouts of batch *k* (in
/// completion order) are concatenated with `"\n\n"` and prepended to every
/// runner's prompt in batch *k+1*, the same augmentation rule as
/// [`crate::run_sequential`].
///
/// The returned list concatenates batch results in batch order; within a
/// batch, order is whatever [`run_parallel`] returned (completion order).
pub async fn run_batched(
    runners: Vec<ProcessRunner>,
    batch_size: usize,
    pass_output: bool,
) -> csa_core::Result<Vec<ProcessResult>> {
    if batch_size < 1 {
        return Err(CoreError::InvalidBatchSize);
    }

    let mut results = Vec::with_capacity(runners.len());
    let mut carry: Option<String> = None;

    debug!(total = runners.len(), batch_size, "starting batched fan-out");
    for chunk in runners.chunks(batch_size) {
        let chunk: Vec<ProcessRunner> = chunk
            .iter()
            .map(|runner| match (&carry, pass_output) {
                (Some(prefix), true) => {
                    runner.with_prompt(format!("{prefix}\n\n{}", runner.prompt()))
                }
                _ => runner.with_prompt(runner.prompt()),
            })
            .collect();

        let batch_results = run_parallel(chunk, Some(batch_size)).await;

        if pass_output {
            let successes: Vec<&str> = batch_results
                .iter()
                .filter(|r| r.succeeded())
                .map(|r| r.stdout.as_str())
                .collect();
            carry = if successes.is_empty() {
                None
            } else {
                Some(successes.join("\n\n"))
            };
        }

        results.extend(batch_results);
    }

    Ok(results)
}
