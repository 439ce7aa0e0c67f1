//! The queue variants: storage × dispatch combinations over [`ThreadQueue`](crate::core::ThreadQueue).
//!
//! | Variant | Storage | Dispatch | Bound | Pausable |
//! |---|---|---|---|---|
//! | [`DedicatedThreadQueue`] | blocking buffer | N long-lived threads | N | yes |
//! | [`EventQueue`] | monitor | N threads woken on enqueue | N | no |
//! | [`MutexQueue`] | monitor | thread per item behind a (named) mutex | 1 | no |
//! | [`SemaphoreQueue`] | monitor | thread per item behind a (named) semaphore | count | no |
//! | [`LocalSemaphoreQueue`] | monitor | thread per item behind an in-process semaphore | count | yes |
//! | [`TaskQueue`] | monitor | long-running runtime tasks behind a semaphore | count | yes |
//! | [`TaskGroupQueue`] | monitor | fixed batches awaited as a whole | batch | yes |
//! | [`ThreadPoolQueue`] | monitor | work items posted to a thread pool | N | yes |

pub mod dedicated;
mod dispatch;
pub mod event;
pub mod gated;
pub mod local_semaphore;
pub mod mutex;
pub mod semaphore;
#[cfg(feature = "tokio-runtime")]
pub mod task;
#[cfg(feature = "tokio-runtime")]
pub mod task_group;
pub mod thread_pool;

pub use dedicated::{Dedicated, DedicatedThreadQueue};
pub use event::{Event, EventQueue};
pub use gated::{GateKind, Gated};
pub use local_semaphore::{LocalSemaphoreGate, LocalSemaphoreQueue};
pub use mutex::{MutexGate, MutexQueue};
pub use semaphore::{SemaphoreGate, SemaphoreQueue};
#[cfg(feature = "tokio-runtime")]
pub use task::{Task, TaskQueue};
#[cfg(feature = "tokio-runtime")]
pub use task_group::{TaskGroup, TaskGroupQueue};
pub use thread_pool::{ThreadPool, ThreadPoolQueue};

use crate::config::{QueueConfig, QueueOptions, ThreadQueueMode};
use crate::core::{CallbackSet, CancellationContext, ProducerConsumer, QueueError};

/// Create a queue of the given variant behind the object-safe contract.
///
/// # Errors
///
/// - `QueueError::Configuration` for invalid options, or a task variant without the `tokio-runtime` feature
/// - `QueueError::NamedObject` when a named token cannot be opened
pub fn create_queue<T: Send + 'static>(
    mode: ThreadQueueMode,
    options: QueueOptions<T>,
    ctx: CancellationContext,
) -> Result<Box<dyn ProducerConsumer<T>>, QueueError> {
    Ok(match mode {
        ThreadQueueMode::Dedicated => Box::new(DedicatedThreadQueue::new(options, ctx)?),
        ThreadQueueMode::Event => Box::new(EventQueue::new(options, ctx)?),
        ThreadQueueMode::Mutex => Box::new(MutexQueue::new(options, ctx)?),
        ThreadQueueMode::Semaphore => Box::new(SemaphoreQueue::new(options, ctx)?),
        ThreadQueueMode::LocalSemaphore => Box::new(LocalSemaphoreQueue::new(options, ctx)?),
        #[cfg(feature = "tokio-runtime")]
        ThreadQueueMode::Task => Box::new(TaskQueue::new(options, ctx)?),
        #[cfg(feature = "tokio-runtime")]
        ThreadQueueMode::TaskGroup => Box::new(TaskGroupQueue::new(options, ctx)?),
        #[cfg(not(feature = "tokio-runtime"))]
        ThreadQueueMode::Task | ThreadQueueMode::TaskGroup => {
            return Err(QueueError::Configuration(format!(
                "{mode} queues require the `tokio-runtime` feature"
            )));
        }
        ThreadQueueMode::ThreadPool => Box::new(ThreadPoolQueue::new(options, ctx)?),
    })
}

/// Build a queue from a loaded configuration and a callback set.
///
/// # Errors
///
/// As [`create_queue`].
pub fn queue_from_config<T: Send + 'static>(
    cfg: &QueueConfig,
    callbacks: CallbackSet<T>,
    ctx: CancellationContext,
) -> Result<Box<dyn ProducerConsumer<T>>, QueueError> {
    create_queue(cfg.mode, QueueOptions::from_config(cfg, callbacks)?, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionResult;
    use std::time::Duration;

    #[test]
    #[cfg(feature = "tokio-runtime")]
    fn test_factory_builds_every_mode() {
        for mode in ThreadQueueMode::ALL {
            let options = QueueOptions::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success)).with_threads(2);
            let q = create_queue(mode, options, CancellationContext::new()).unwrap();
            assert_eq!(q.mode(), mode);
            assert_eq!(q.can_pause(), mode.can_pause());
            for i in 0..4 {
                q.enqueue(i).unwrap();
            }
            q.complete().unwrap();
            assert!(q.wait_timeout(Duration::from_secs(10)), "{mode} did not complete");
            assert_eq!(q.stats().succeeded, 4, "{mode}");
        }
    }
}
