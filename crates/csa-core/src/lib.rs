//! Shared types for the orchestration core: the error enum returned by
//! fallible constructors, plus the small set of conventions every other
//! crate in the workspace builds on (a `Result` alias using that error).

pub mod error;

pub use error::CoreError;

pub type Result<T> = std::result::Result<T, CoreError>;
