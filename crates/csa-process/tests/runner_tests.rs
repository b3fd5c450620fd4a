//! Integration tests driving `ProcessRunner` against the deterministic
//! fixture script in `tests/fixtures/fixture.sh`, standing in for the
//! opaque external agent CLI this crate otherwise treats as a black box.

use std::path::PathBuf;
use std::sync::Mutex;

use csa_process::{ProcessRunner, RunnerConfig};

// CSA_AGENT_EXECUTABLE is process-wide mutable state; serialize tests that
// touch it so they don't race each other's fixture selection.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fixture.sh")
}

struct FixtureGuard<'a>(std::sync::MutexGuard<'a, ()>);

impl<'a> FixtureGuard<'a> {
    fn install() -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        unsafe {
            std::env::set_var("CSA_AGENT_EXECUTABLE", fixture_path());
        }
        FixtureGuard(guard)
    }
}

impl Drop for FixtureGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            std::env::remove_var("CSA_AGENT_EXECUTABLE");
        }
    }
}

#[tokio::test]
async fn echoes_prompt_and_exits_zero() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new("A", "proc_1", dir.path(), dir.path(), RunnerConfig::new())
        .unwrap();

    let result = runner.run().await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "A\n");
    assert!(!result.timed_out);
    assert!(dir.path().join("proc_1.log").exists());
}

#[tokio::test]
async fn nonzero_exit_surfaces_as_child_exit_code() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new(
        "fail:3",
        "proc_1",
        dir.path(),
        dir.path(),
        RunnerConfig::new(),
    )
    .unwrap();

    let result = runner.run().await;

    assert_eq!(result.exit_code, 3);
    assert!(result.stderr.contains("failing"));
}

#[tokio::test]
async fn output_completeness_for_unterminated_streams() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new(
        "bytes:2000",
        "proc_1",
        dir.path(),
        dir.path(),
        RunnerConfig::new(),
    )
    .unwrap();

    let result = runner.run().await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.len(), 2000);
    assert!(result.stdout.chars().all(|c| c == 'a'));
    assert_eq!(result.stderr.len(), 2000);
    assert!(result.stderr.chars().all(|c| c == 'b'));
}

#[tokio::test]
async fn timeout_terminates_a_long_sleeping_child() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunnerConfig::new();
    config.timeout_seconds = Some(1.0);
    let runner = ProcessRunner::new("sleep:30", "proc_1", dir.path(), dir.path(), config).unwrap();

    let start = std::time::Instant::now();
    let result = runner.run().await;
    let elapsed = start.elapsed();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert!(result.stderr.contains("timed out"));
    assert!(elapsed.as_secs_f64() <= 8.0, "took {elapsed:?}");
}

#[tokio::test]
async fn timeout_mid_stream_captures_partial_output() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunnerConfig::new();
    config.timeout_seconds = Some(0.5);
    let runner = ProcessRunner::new(
        "ticks:40:100",
        "proc_1",
        dir.path(),
        dir.path(),
        config,
    )
    .unwrap();

    let result = runner.run().await;

    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    let lines = result.stdout.lines().count();
    assert!((1..=12).contains(&lines), "got {lines} lines: {:?}", result.stdout);
}

#[tokio::test]
async fn spawn_failure_on_missing_executable_is_surfaced_not_raised() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    unsafe {
        std::env::set_var("CSA_AGENT_EXECUTABLE", "/nonexistent-csa-executable");
    }
    let dir = tempfile::tempdir().unwrap();
    let runner =
        ProcessRunner::new("hello", "proc_1", dir.path(), dir.path(), RunnerConfig::new())
            .unwrap();

    let result = runner.run().await;
    unsafe {
        std::env::remove_var("CSA_AGENT_EXECUTABLE");
    }

    assert_eq!(result.exit_code, -1);
    assert!(result.stderr.contains("nonexistent"));
    assert!(result.duration_seconds < 2.0);
}

#[tokio::test]
async fn terminate_stops_a_sleeping_child_before_its_own_timeout() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let runner = std::sync::Arc::new(
        ProcessRunner::new("sleep:30", "proc_1", dir.path(), dir.path(), RunnerConfig::new())
            .unwrap(),
    );

    let runner_for_run = runner.clone();
    let handle = tokio::spawn(async move { runner_for_run.run().await });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    runner.terminate();

    let result = tokio::time::timeout(std::time::Duration::from_secs(8), handle)
        .await
        .expect("run() did not return after terminate()")
        .unwrap();

    assert_eq!(result.exit_code, -1);
    assert!(!result.timed_out);
    assert!(result.stderr.contains("terminated by caller"));
}

#[tokio::test]
async fn running_a_second_time_does_not_spawn_again() {
    let _fixture = FixtureGuard::install();
    let dir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new("A", "proc_1", dir.path(), dir.path(), RunnerConfig::new())
        .unwrap();

    let first = runner.run().await;
    let second = runner.run().await;

    assert_eq!(first.exit_code, 0);
    assert_eq!(second.exit_code, -1);
    assert!(second.stderr.contains("more than once"));
}
