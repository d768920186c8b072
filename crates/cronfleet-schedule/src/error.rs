//! Schedule error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while installing a table or preparing its environment.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} rejected the table: {reason}")]
    Install { program: String, reason: String },

    #[error("failed to read the installed table: {0}")]
    Inspect(String),

    #[error("failed to create {path}: {source}")]
    Provision {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
