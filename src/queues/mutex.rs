//! Mutex-gated queue: one item at a time, optionally across processes.

use tracing::warn;

use super::gated::{GateKind, Gated};
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::core::{AdmissionToken, LocalSemaphore, NamedToken, QueueError, ThreadQueue};

/// Gate holding a single permit, named when the options carry a name.
#[derive(Debug)]
pub struct MutexGate;

impl GateKind for MutexGate {
    const MODE: ThreadQueueMode = ThreadQueueMode::Mutex;

    fn open<T>(options: &QueueOptions<T>, threads: usize) -> Result<Box<dyn AdmissionToken>, QueueError> {
        if threads > 1 {
            warn!(threads, "mutex queue runs one item at a time, ignoring thread count");
        }
        Ok(match &options.name {
            Some(name) => Box::new(NamedToken::open_or_create(name, 1, options.access)?),
            None => Box::new(LocalSemaphore::new(1)),
        })
    }
}

/// Queue whose items run one at a time, each on its own thread.
pub type MutexQueue<T> = ThreadQueue<T, Gated<T, MutexGate>>;
