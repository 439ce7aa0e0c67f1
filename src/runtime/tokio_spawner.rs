//! Tokio runtime spawner implementation.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};

use super::thread_pool::{Job, Spawn};
use crate::core::QueueError;

/// Spawner that runs jobs on a tokio runtime's blocking pool.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Handle,
    /// Runtime built by this spawner, kept alive by every clone.
    owned: Option<Arc<Runtime>>,
}

impl TokioSpawner {
    /// Create a spawner from an existing runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Create a spawner owning a new multi-threaded runtime with `worker_threads` workers.
    ///
    /// # Errors
    ///
    /// `QueueError::Spawn` when the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, QueueError> {
        let runtime = build_runtime("tq-tokio", worker_threads, worker_threads)?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(runtime)),
        })
    }

    /// Handle of the runtime jobs are posted to.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, job: Job) -> Result<(), Job> {
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}

impl fmt::Debug for TokioSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioSpawner")
            .field("owned", &self.owned.is_some())
            .finish_non_exhaustive()
    }
}

/// Build a multi-threaded runtime whose blocking pool holds `blocking_threads` threads.
pub(crate) fn build_runtime(name: &str, worker_threads: usize, blocking_threads: usize) -> Result<Runtime, QueueError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .max_blocking_threads(blocking_threads.max(1))
        .thread_name(name)
        .enable_all()
        .build()
        .map_err(QueueError::Spawn)
}
