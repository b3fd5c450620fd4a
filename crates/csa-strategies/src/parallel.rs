//! `run_parallel`: bounded fan-out, results in completion order.

use std::sync::Arc;

use csa_process::{ProcessResult, ProcessRunner};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Any reasonable small default is spec-conformant; 4 matches the number
/// the spec itself names.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Run every runner concurrently, at most `max_workers` alive at once
/// (default `min(len(runners), 4)`). Returns results in completion order,
/// each carrying its own `process_id` so callers can reconstitute the
/// mapping. A runner whose task panics synthesizes a failed result rather
/// than propagating.
pub async fn run_parallel(
    runners: Vec<ProcessRunner>,
    max_workers: Option<usize>,
) -> Vec<ProcessResult> {
    if runners.is_empty() {
        return Vec::new();
    }
    let max_workers = max_workers
        .unwrap_or_else(|| runners.len().min(DEFAULT_MAX_WORKERS))
        .max(1);
    debug!(count = runners.len(), max_workers, "starting parallel fan-out");
    let semaphore = Arc::new(Semaphore::new(max_workers));

    let mut set = JoinSet::new();
    for runner in runners {
        let runner = Arc::new(runner);
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed while runners are in flight");
            let result = runner.run().await;
            drop(permit);
            result
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(join_error) => {
                warn!(error = %join_error, "runner task did not complete");
                results.push(ProcessResult::synthesized_failure(
                    "unknown",
                    format!("runner task did not complete: {join_error}"),
                    0.0,
                ));
            }
        }
    }
    debug!(count = results.len(), "all parallel workers joined");
    results
}
