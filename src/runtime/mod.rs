//! Runtime collaborators: thread bookkeeping, the shared worker pool and the tokio spawner.

pub mod thread_pool;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;
pub mod workers;

pub use thread_pool::{Job, Spawn, WorkerThreadPool};
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
pub use workers::{join_within, remaining, spawn_named, WorkerHandles};
