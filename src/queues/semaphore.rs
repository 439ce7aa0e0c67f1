//! Semaphore-gated queue, optionally shared across processes by name.

use super::gated::{GateKind, Gated};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{AdmissionToken, LocalSemaphore, NamedToken, QueueError, ThreadQueue};

/// Gate holding `threads` permits, named when the options carry a name.
///
/// A queue opening an existing named token adopts the owner's capacity.
#[derive(Debug)]
pub struct SemaphoreGate;

impl GateKind for SemaphoreGate {
    const MODE: ThreadQueueMode = ThreadQueueMode::Semaphore;

    fn open<T>(options: &QueueOptions<T>, threads: usize) -> Result<Box<dyn AdmissionToken>, QueueError> {
        Ok(match &options.name {
            Some(name) => Box::new(NamedToken::open_or_create(name, threads, options.access)?),
            None => Box::new(LocalSemaphore::new(threads)),
        })
    }
}

/// Queue running up to the semaphore count of items, each on its own thread.
pub type SemaphoreQueue<T> = ThreadQueue<T, Gated<T, SemaphoreGate>>;
