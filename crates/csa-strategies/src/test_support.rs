//! Shared by this crate's `#[cfg(test)]` modules: points `ProcessRunner` at
//! the deterministic fixture script from `csa-process`'s test suite instead
//! of the real external agent CLI, serialized because `CSA_AGENT_EXECUTABLE`
//! is process-wide state.

use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub struct FixtureGuard<'a>(std::sync::MutexGuard<'a, ()>);

impl<'a> FixtureGuard<'a> {
    pub fn install() -> Self {
        let guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let fixture = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../csa-process/tests/fixtures/fixture.sh"
        );
        unsafe {
            std::env::set_var("CSA_AGENT_EXECUTABLE", fixture);
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
