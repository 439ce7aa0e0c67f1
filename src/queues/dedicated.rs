//! Dedicated thread pool over a blocking buffer. Pausable.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, select_biased, Receiver, Sender};

use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{spawn_worker, QueueCore, QueueError, Shared, Strategy, ThreadQueue};
use crate::infra::storage::BlockingBuffer;
use crate::runtime::WorkerHandles;

/// N long-lived threads, each looping on a blocking dequeue.
///
/// Idle workers also listen on a nudge channel so a pause reaches them
/// before they can pull another item.
#[derive(Debug)]
pub struct Dedicated<T> {
    buffer: BlockingBuffer<T>,
    nudge_tx: Sender<()>,
    nudge_rx: Receiver<()>,
    threads: usize,
    workers: WorkerHandles,
}

impl<T: Send + 'static> Dedicated<T> {
    fn work(shared: &Shared<T, Self>) {
        let core = &shared.core;
        let rx = shared.strategy.buffer.receiver();
        let nudges = shared.strategy.nudge_rx.clone();
        while core.wait_while_paused() {
            // Nudges win ties so a paused queue leaves new items in the buffer.
            let received = select_biased! {
                recv(nudges) -> _ => None,
                recv(rx) -> item => Some(item),
            };
            let Some(received) = received else {
                continue;
            };
            let Ok(item) = received else {
                break;
            };
            if core.is_canceled() {
                core.discard(vec![item]);
                break;
            }
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

impl<T: Send + 'static> Strategy<T> for Dedicated<T> {
    const MODE: ThreadQueueMode = ThreadQueueMode::Dedicated;

    fn build(_options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        let (nudge_tx, nudge_rx) = bounded(threads);
        Ok(Self {
            buffer: BlockingBuffer::new(),
            nudge_tx,
            nudge_rx,
            threads,
            workers: WorkerHandles::new(),
        })
    }

    fn concurrency(&self) -> usize {
        self.threads
    }

    fn push(&self, item: T) -> Result<(), T> {
        self.buffer.push(item)
    }

    fn queued(&self) -> usize {
        self.buffer.len()
    }

    fn drain(&self) -> Vec<T> {
        self.buffer.drain()
    }

    fn wake(&self, core: &QueueCore<T>) {
        // Closing disconnects idle workers once the buffer is empty.
        if core.is_complete_marked() || core.is_canceled() {
            self.buffer.close();
        }
        if core.is_paused() {
            for _ in 0..self.threads {
                if self.nudge_tx.try_send(()).is_err() {
                    break;
                }
            }
        }
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
}

/// Queue drained by a fixed set of dedicated threads.
pub type DedicatedThreadQueue<T> = ThreadQueue<T, Dedicated<T>>;
