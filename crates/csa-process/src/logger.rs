//! Dual-sink line writer shared by [`crate::ProcessRunner`] and session code.
//!
//! One line per call, `ISO8601  LEVEL  TAG  MESSAGE\n`, flushed before the
//! call returns. A write failure is logged to the console (if streaming) and
//! otherwise swallowed — a missing log line must never fail a run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Thread/task-safe writer bound to a single file.
///
/// Concurrency is handled with a plain `Mutex` around the file handle: the
/// spec only requires that concurrent calls never interleave within a single
/// line, which a held lock across one `write_all` + `flush` trivially gives.
#[derive(Debug)]
pub struct Logger {
    file: Mutex<File>,
    mirror_console: bool,
}

impl Logger {
    /// Open (create if missing, append otherwise) a log file at `path`.
    pub fn open(path: impl AsRef<Path>, mirror_console: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            mirror_console,
        })
    }

    /// Write one `level`/`tag`-tagged line. Never panics on I/O failure.
    pub fn log(&self, message: &str, level: Level, tag: &str) {
        let line = format!(
            "{}  {}  {}  {}\n",
            Utc::now().to_rfc3339(),
            level.as_str(),
            tag,
            message
        );
        let mut guard = match self.file.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = guard.write_all(line.as_bytes()).and_then(|_| guard.flush()) {
            warn!(error = %e, "log write failed");
        }
        drop(guard);
        if self.mirror_console {
            print!("{message}");
            if !message.ends_with('\n') {
                println!();
            }
        }
    }
}
