//! Task-based queue: a dispatcher schedules long-running runtime tasks behind a semaphore.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Runtime;

use super::dispatch::{run_dispatcher, Admission};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{
    spawn_worker, AdmissionToken, LocalSemaphore, QueueCore, QueueError, Shared, Strategy, ThreadQueue,
};
use crate::infra::storage::MonitorStorage;
use crate::runtime::tokio_spawner::build_runtime;
use crate::runtime::WorkerHandles;

/// Monitor storage drained onto a private tokio runtime's blocking pool.
///
/// The runtime is built on first enqueue and shut down on dispose.
#[derive(Debug)]
pub struct Task<T> {
    storage: MonitorStorage<T>,
    gate: LocalSemaphore,
    runtime: Mutex<Option<Runtime>>,
    dispatcher: WorkerHandles,
}

impl<T: Send + 'static> Strategy<T> for Task<T> {
    const MODE: ThreadQueueMode = ThreadQueueMode::Task;

    fn build(_options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        Ok(Self {
            storage: MonitorStorage::new(),
            gate: LocalSemaphore::new(threads),
            runtime: Mutex::new(None),
            dispatcher: WorkerHandles::new(),
        })
    }

    fn concurrency(&self) -> usize {
        self.gate.capacity()
    }

    fn push(&self, item: T) -> Result<(), T> {
        self.storage.push(item);
        Ok(())
    }

    fn queued(&self) -> usize {
        self.storage.len()
    }

    fn drain(&self) -> Vec<T> {
        self.storage.drain()
    }

    fn wake(&self, _core: &QueueCore<T>) {
        self.storage.wake_all();
        self.gate.interrupt();
    }

    fn start(shared: &Arc<Shared<T, Self>>) -> Result<(), QueueError> {
        let task = &shared.strategy;
        let runtime = build_runtime(&format!("{}-task", shared.core.label()), 1, task.gate.capacity())?;
        let handle = runtime.handle().clone();
        *task.runtime.lock() = Some(runtime);

        let dispatcher = spawn_worker(shared, "dispatcher", 0, move |shared| {
            let task = &shared.strategy;
            let admission = Admission {
                token: Some(&task.gate),
                bound: None,
            };
            run_dispatcher(shared, &task.storage, admission, |job| {
                drop(handle.spawn_blocking(job));
                Ok(())
            });
        })?;
        task.dispatcher.push(dispatcher);
        Ok(())
    }

    fn join(&self, label: &str, deadline: Option<Instant>) {
        self.dispatcher.join_all(label, deadline);
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }

    fn storage(&self) -> Option<&MonitorStorage<T>> {
        Some(&self.storage)
    }
}

/// Queue scheduling each item as a long-running task on a private runtime.
pub type TaskQueue<T> = ThreadQueue<T, Task<T>>;
