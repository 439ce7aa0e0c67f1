//! Event-driven queue: N threads woken on enqueue.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{spawn_worker, QueueCore, QueueError, Shared, Strategy, ThreadQueue};
use crate::infra::storage::MonitorStorage;
use crate::runtime::WorkerHandles;

/// Monitor storage drained by N threads blocked on its condition variable.
#[derive(Debug)]
pub struct Event<T> {
    storage: MonitorStorage<T>,
    threads: usize,
    workers: WorkerHandles,
}

impl<T: Send + 'static> Event<T> {
    fn work(shared: &Shared<T, Self>) {
        let core = &shared.core;
        while let Some(item) = core.next_item(&shared.strategy.storage) {
            let Some(item) = core.admit(item) else {
                continue;
            };
            if !core.begin_run(None) {
                core.discard(vec![item]);
                break;
            }
            core.run_item(item, None);
        }
    }
}

impl<T: Send + 'static> Strategy<T> for Event<T> {
    const MODE: ThreadQueueMode = ThreadQueueMode::Event;

    fn build(_options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        Ok(Self {
            storage: MonitorStorage::new(),
            threads,
            workers: WorkerHandles::new(),
        })
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
        for id in 0..shared.strategy.threads {
            let handle = spawn_worker(shared, "worker", id, |shared| Self::work(shared))?;
            shared.strategy.workers.push(handle);
        }
        Ok(())
    }

    fn join(&self, label: &str, deadline: Option<Instant>) {
        self.workers.join_all(label, deadline);
    }

    fn storage(&self) -> Option<&MonitorStorage<T>> {
        Some(&self.storage)
    }
}

/// Queue whose worker threads sleep until an item is enqueued.
pub type EventQueue<T> = ThreadQueue<T, Event<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::{CancellationContext, ExecutionResult};

    #[test]
    fn test_drains_and_rejects_pause() {
        let options = QueueOptions::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success)).with_threads(2);
        let q = EventQueue::new(options, CancellationContext::new()).unwrap();
        assert!(matches!(q.pause(), Err(QueueError::InvalidOperation(_))));
        assert!(matches!(q.resume(), Err(QueueError::InvalidOperation(_))));

        for i in 0..20 {
            q.enqueue(i).unwrap();
        }
        q.complete().unwrap();
        assert!(q.wait_timeout(Duration::from_secs(5)));
        assert_eq!(q.stats().succeeded, 20);
        assert!(q.is_empty());
    }

    #[test]
    fn test_clear_discards_queued() {
        let gate = Arc::new(parking_lot::Mutex::new(()));
        let held = gate.lock();
        let remote = Arc::clone(&gate);
        let options = QueueOptions::new(move |_: &u32, _: &CancellationContext| {
            drop(remote.lock());
            Ok(ExecutionResult::Success)
        })
        .with_threads(1);
        let q = EventQueue::new(options, CancellationContext::new()).unwrap();
        for i in 0..5 {
            q.enqueue(i).unwrap();
        }
        // Worker is parked inside the first item; the rest stay queued.
        while q.running() == 0 {
            std::thread::yield_now();
        }
        let cleared = q.clear().unwrap();
        drop(held);
        assert_eq!(cleared, 4);
        q.complete().unwrap();
        assert!(q.wait_timeout(Duration::from_secs(5)));
        assert_eq!(q.stats().discarded, 4);
    }
}
