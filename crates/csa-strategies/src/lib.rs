//! Fan-out strategies for running a batch of [`csa_process::ProcessRunner`]s:
//! parallel, sequential, fallback, and batched composition.

mod batched;
mod fallback;
mod parallel;
mod sequential;

#[cfg(test)]
mod test_support;

pub use batched::run_batched;
pub use fallback::run_with_fallback;
pub use parallel::{run_parallel, DEFAULT_MAX_WORKERS};
pub use sequential::run_sequential;
