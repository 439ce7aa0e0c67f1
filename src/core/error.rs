//! Error types for queue operations.

use std::io;

use thiserror::Error;

/// Failure raised by an execute callback for a single item.
///
/// These never escape a worker: the queue classifies them into an
/// [`ExecutionResult`](crate::core::ExecutionResult) and hands them to the
/// result callback.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The callback observed cancellation and gave up.
    #[error("task canceled")]
    Canceled,
    /// The callback ran out of time.
    #[error("task timed out")]
    Timeout,
    /// The callback failed with an application error.
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),
    /// The callback panicked; the payload message is captured when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Errors produced by queue components.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Options or configuration values are out of range.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The operation is not valid in the current state of the queue.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// An item execution failure surfaced to a caller.
    #[error("execution error: {0}")]
    Execution(#[from] TaskError),
    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,
    /// The queue's cancellation context has been triggered.
    #[error("operation canceled")]
    Canceled,
    /// A named admission token could not be opened or created.
    #[error("named object `{name}` unavailable: {source}")]
    NamedObject {
        /// Requested object name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),
}

impl QueueError {
    pub(crate) fn completion_marked() -> Self {
        Self::InvalidOperation("completion marked".into())
    }

    pub(crate) fn disposed() -> Self {
        Self::InvalidOperation("queue disposed".into())
    }

    pub(crate) fn not_pausable(mode: impl std::fmt::Display) -> Self {
        Self::InvalidOperation(format!("{mode} queue cannot pause"))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
