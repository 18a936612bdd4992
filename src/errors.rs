// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskGroupError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("task group has been disposed")]
    Disposed,

    #[error("cancellation requested; the group is closed for new tasks")]
    CancellationRequested,

    #[error("{name} out of range: {index} (len {len})")]
    IndexOutOfRange {
        name: &'static str,
        index: usize,
        len: usize,
    },

    #[error("task {0} is already associated with a group")]
    AlreadyAssociated(TaskId),

    #[error("task {0} has already finished and cannot be scheduled again")]
    TaskFinished(TaskId),

    #[error("task {0} appears more than once in the same batch")]
    DuplicateTask(TaskId),

    #[error("task {0} is running and cannot be removed")]
    TaskBusy(TaskId),

    #[error("unable to dispose a task group while it is executing")]
    Busy,

    #[error("no tokio runtime available to drive the task group")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskGroupError>;
