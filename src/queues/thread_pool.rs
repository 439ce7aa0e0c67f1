//! Thread-pool queue: a dispatcher posts work items to a shared pool.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use super::dispatch::{run_dispatcher, Admission};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{spawn_worker, CancellationContext, QueueCore, QueueError, Shared, Strategy, ThreadQueue};
use crate::infra::storage::MonitorStorage;
use crate::runtime::{Spawn, WorkerHandles, WorkerThreadPool};

/// Where posted work items run.
#[derive(Debug)]
enum Pool {
    /// Created on first enqueue, shut down on dispose.
    Private(Option<Arc<WorkerThreadPool>>),
    /// Supplied by the caller and shared with other users.
    External(Arc<dyn Spawn>),
}

/// Monitor storage drained onto a thread pool, throttled by the running count.
#[derive(Debug)]
pub struct ThreadPool<T> {
    storage: MonitorStorage<T>,
    threads: usize,
    pool: Mutex<Pool>,
    dispatcher: WorkerHandles,
}

impl<T> ThreadPool<T> {
    fn with_pool(threads: usize, pool: Pool) -> Self {
        Self {
            storage: MonitorStorage::new(),
            threads,
            pool: Mutex::new(pool),
            dispatcher: WorkerHandles::new(),
        }
    }

    fn spawner(&self, label: &str) -> Result<Arc<dyn Spawn>, QueueError> {
        let mut pool = self.pool.lock();
        match &mut *pool {
            Pool::External(spawner) => Ok(Arc::clone(spawner)),
            Pool::Private(Some(private)) => Ok(Arc::clone(private) as Arc<dyn Spawn>),
            Pool::Private(slot) => {
                let private = Arc::new(WorkerThreadPool::new(format!("{label}-pool"), self.threads)?);
                *slot = Some(Arc::clone(&private));
                Ok(private as Arc<dyn Spawn>)
            }
        }
    }
}

impl<T: Send + 'static> Strategy<T> for ThreadPool<T> {
    const MODE: ThreadQueueMode = ThreadQueueMode::ThreadPool;

    fn build(_options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        Ok(Self::with_pool(threads, Pool::Private(None)))
    }

    fn concurrency(&self) -> usize {
        self.threads
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
        let spawner = shared.strategy.spawner(shared.core.label())?;
        let dispatcher = spawn_worker(shared, "dispatcher", 0, move |shared| {
            let pool = &shared.strategy;
            let admission = Admission {
                token: None,
                bound: Some(pool.threads),
            };
            run_dispatcher(shared, &pool.storage, admission, |job| {
                if let Err(job) = spawner.spawn(job) {
                    warn!(queue = %shared.core.label(), "pool rejected work item, running it on the dispatcher");
                    job();
                }
                Ok(())
            });
        })?;
        shared.strategy.dispatcher.push(dispatcher);
        Ok(())
    }

    fn join(&self, label: &str, deadline: Option<Instant>) {
        self.dispatcher.join_all(label, deadline);
        let private = match &mut *self.pool.lock() {
            Pool::Private(slot) => slot.take(),
            Pool::External(_) => None,
        };
        if let Some(private) = private {
            private.shutdown_by(deadline);
        }
    }

    fn storage(&self) -> Option<&MonitorStorage<T>> {
        Some(&self.storage)
    }
}

/// Queue posting items to a thread pool.
pub type ThreadPoolQueue<T> = ThreadQueue<T, ThreadPool<T>>;

impl<T: Send + 'static> ThreadQueue<T, ThreadPool<T>> {
    /// Create a queue posting to a caller-supplied pool instead of a private one.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` for invalid options.
    pub fn with_spawner(
        options: QueueOptions<T>,
        ctx: CancellationContext,
        spawner: Arc<dyn Spawn>,
    ) -> Result<Self, QueueError> {
        options.validate()?;
        let strategy = ThreadPool::with_pool(options.effective_threads(), Pool::External(spawner));
        Ok(Self::with_strategy(options, &ctx, strategy))
    }
}
