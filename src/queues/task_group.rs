//! Batch task-group queue: fixed-size batches, each awaited as a whole.
//!
//! The dispatcher takes up to `threads` items, runs them as long-running
//! tasks and waits for the whole batch before taking the next one. With a
//! threshold set, every batch lasts at least that long.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{spawn_worker, QueueCore, QueueError, Shared, Strategy, ThreadQueue};
use crate::infra::storage::MonitorStorage;
use crate::runtime::tokio_spawner::build_runtime;
use crate::runtime::WorkerHandles;

/// Monitor storage drained in batches onto a private tokio runtime.
#[derive(Debug)]
pub struct TaskGroup<T> {
    storage: MonitorStorage<T>,
    batch_size: usize,
    runtime: Mutex<Option<Runtime>>,
    dispatcher: WorkerHandles,
}

impl<T: Send + 'static> TaskGroup<T> {
    fn dispatch(shared: &Arc<Shared<T, Self>>, handle: &Handle) {
        let core = &shared.core;
        let group = &shared.strategy;
        while core.wait_while_paused() {
            let Some(first) = core.next_item(&group.storage) else {
                break;
            };
            let mut batch = vec![first];
            batch.extend(group.storage.pop_batch(group.batch_size - 1));
            let started = Instant::now();
            debug!(queue = %core.label(), size = batch.len(), "running batch");

            let mut tasks = Vec::with_capacity(batch.len());
            let mut items = batch.into_iter();
            while let Some(item) = items.next() {
                let Some(item) = core.admit(item) else {
                    continue;
                };
                if !core.begin_run(None) {
                    core.discard(std::iter::once(item).chain(items.by_ref()).collect());
                    break;
                }
                let runner = Arc::clone(shared);
                tasks.push(handle.spawn_blocking(move || runner.core.run_item(item, None)));
            }
            handle.block_on(async {
                for task in tasks {
                    let _ = task.await;
                }
            });

            if let Some(threshold) = core.threshold() {
                let elapsed = started.elapsed();
                if elapsed < threshold {
                    core.token().wait_timeout(threshold - elapsed);
                }
            }
        }
    }
}

impl<T: Send + 'static> Strategy<T> for TaskGroup<T> {
    const MODE: ThreadQueueMode = ThreadQueueMode::TaskGroup;

    fn build(_options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        Ok(Self {
            storage: MonitorStorage::new(),
            batch_size: threads.max(1),
            runtime: Mutex::new(None),
            dispatcher: WorkerHandles::new(),
        })
    }

    fn concurrency(&self) -> usize {
        self.batch_size
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
    }

    fn start(shared: &Arc<Shared<T, Self>>) -> Result<(), QueueError> {
        let group = &shared.strategy;
        let runtime = build_runtime(&format!("{}-group", shared.core.label()), 1, group.batch_size)?;
        let handle = runtime.handle().clone();
        *group.runtime.lock() = Some(runtime);

        let dispatcher = spawn_worker(shared, "dispatcher", 0, move |shared| Self::dispatch(shared, &handle))?;
        group.dispatcher.push(dispatcher);
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

/// Queue running items in fixed-size batches.
pub type TaskGroupQueue<T> = ThreadQueue<T, TaskGroup<T>>;
