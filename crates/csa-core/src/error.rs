//! Shared error type for the orchestration core.
//!
//! Per the core's failure policy, `CoreError` is only ever returned from
//! constructors and factories — validation that must reject before any
//! process exists. Everything downstream of a successful construction
//! degrades to a `ProcessResult` with `exit_code = -1` instead of an `Err`
//! (see `csa-process`).

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("process_id must not be empty")]
    EmptyProcessId,

    #[error("pattern_name must not be empty")]
    EmptyPatternName,

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("working_dir does not exist: {0}")]
    WorkingDirNotFound(String),

    #[error("duplicate process_id '{0}' in session")]
    DuplicateProcessId(String),

    #[error("session directory already exists: {0}")]
    SessionDirExists(String),

    #[error("session is closed; no further runners may be created")]
    SessionClosed,

    #[error("batch_size must be >= 1")]
    InvalidBatchSize,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
