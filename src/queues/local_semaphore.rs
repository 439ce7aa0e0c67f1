//! In-process semaphore gated queue. Pausable.

use tracing::warn;

use super::gated::{GateKind, Gated};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{AdmissionToken, LocalSemaphore, QueueError, ThreadQueue};

/// Gate holding `threads` in-process permits.
#[derive(Debug)]
pub struct LocalSemaphoreGate;

impl GateKind for LocalSemaphoreGate {
    const MODE: ThreadQueueMode = ThreadQueueMode::LocalSemaphore;

    fn open<T>(options: &QueueOptions<T>, threads: usize) -> Result<Box<dyn AdmissionToken>, QueueError> {
        if let Some(name) = &options.name {
            warn!(name = %name, "local semaphore queue ignores the token name");
        }
        Ok(Box::new(LocalSemaphore::new(threads)))
    }
}

/// Queue running up to `threads` items, each on its own thread, gated in-process.
pub type LocalSemaphoreQueue<T> = ThreadQueue<T, Gated<T, LocalSemaphoreGate>>;
