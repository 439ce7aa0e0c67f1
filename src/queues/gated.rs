//! Dispatcher fanning into per-item threads behind an admission token.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::dispatch::{run_dispatcher, Admission};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{spawn_worker, AdmissionToken, QueueCore, QueueError, Shared, Strategy};
use crate::infra::storage::MonitorStorage;
use crate::runtime::{spawn_named, WorkerHandles};

/// Which token guards a [`Gated`] strategy.
pub trait GateKind: Send + Sync + 'static {
    /// Variant implemented with this gate.
    const MODE: ThreadQueueMode;

    /// Open the admission token for a queue requesting `threads` workers.
    ///
    /// # Errors
    ///
    /// `QueueError::NamedObject` when a named token cannot be opened or created.
    fn open<T>(options: &QueueOptions<T>, threads: usize) -> Result<Box<dyn AdmissionToken>, QueueError>;
}

/// Monitor storage, one dispatcher, a thread per item, a permit per running item.
#[derive(Debug)]
pub struct Gated<T, K> {
    storage: MonitorStorage<T>,
    token: Box<dyn AdmissionToken>,
    dispatcher: WorkerHandles,
    items: WorkerHandles,
    launched: AtomicUsize,
    _kind: PhantomData<fn() -> K>,
}

impl<T, K> Gated<T, K> {
    /// Token guarding execution.
    pub fn token(&self) -> &dyn AdmissionToken {
        self.token.as_ref()
    }
}

impl<T: Send + 'static, K: GateKind> Strategy<T> for Gated<T, K> {
    const MODE: ThreadQueueMode = K::MODE;

    fn build(options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError> {
        let token = K::open(options, threads)?;
        if let Some(name) = token.name() {
            info!(mode = %K::MODE, name, owner = token.is_owner(), capacity = token.capacity(), "named token opened");
        }
        Ok(Self {
            storage: MonitorStorage::new(),
            token,
            dispatcher: WorkerHandles::new(),
            items: WorkerHandles::new(),
            launched: AtomicUsize::new(0),
            _kind: PhantomData,
        })
    }

    fn concurrency(&self) -> usize {
        self.token.capacity()
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
        self.token.interrupt();
    }

    fn start(shared: &Arc<Shared<T, Self>>) -> Result<(), QueueError> {
        let handle = spawn_worker(shared, "dispatcher", 0, |shared| {
            let gate = &shared.strategy;
            let admission = Admission {
                token: Some(gate.token.as_ref()),
                bound: None,
            };
            run_dispatcher(shared, &gate.storage, admission, |job| {
                gate.items.reap();
                let n = gate.launched.fetch_add(1, Ordering::Relaxed);
                let handle = spawn_named(format!("{}-item-{n}", shared.core.label()), job)?;
                gate.items.push(handle);
                Ok(())
            });
        })?;
        shared.strategy.dispatcher.push(handle);
        Ok(())
    }

    fn join(&self, label: &str, deadline: Option<Instant>) {
        self.dispatcher.join_all(label, deadline);
        self.items.join_all(label, deadline);
    }

    fn storage(&self) -> Option<&MonitorStorage<T>> {
        Some(&self.storage)
    }
}
