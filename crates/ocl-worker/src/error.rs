//! Error types for the worker.

use std::path::PathBuf;

use ocl_core::CoreError;
use thiserror::Error;

use crate::tasks::TaskId;

/// Errors raised by the task runner, configuration and persistence.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// An operation of the content store failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// File system error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot error in {path}: {source}")]
    Snapshot {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration in {path}: {source}")]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// No task with this id is registered, or its result was already taken.
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    /// The task panicked or was aborted by the runtime.
    #[error("Task {id} did not complete: {message}")]
    TaskAborted {
        /// Task id.
        id: TaskId,
        /// Join error description.
        message: String,
    },

    /// The runner is shutting down.
    #[error("Task runner is closed")]
    Closed,
}

impl WorkerError {
    /// Returns true when the error reports a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(CoreError::Cancelled))
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
