//! Thread handle bookkeeping with bounded joins.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::QueueError;

/// Spawn a named OS thread.
///
/// # Errors
///
/// `QueueError::Spawn` when the OS refuses the thread.
pub fn spawn_named<F>(name: String, f: F) -> Result<JoinHandle<()>, QueueError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(f)
        .map_err(QueueError::Spawn)
}

/// Join `handle`, giving up after `timeout`. Returns `true` if it was joined.
///
/// A thread that does not exit in time is detached.
pub fn join_within(label: &str, handle: JoinHandle<()>, timeout: Option<Duration>) -> bool {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    if handle.thread().id() == thread::current().id() {
        debug!(queue = %label, thread = %name, "skipping self-join");
        return false;
    }
    let Some(timeout) = timeout.filter(|_| !handle.is_finished()) else {
        if handle.join().is_err() {
            warn!(queue = %label, thread = %name, "thread panicked");
        }
        return true;
    };

    let (tx, rx) = bounded(1);
    let joiner = thread::spawn(move || {
        let _ = tx.send(handle.join().is_ok());
    });
    match rx.recv_timeout(timeout) {
        Ok(ok) => {
            if !ok {
                warn!(queue = %label, thread = %name, "thread panicked");
            }
            let _ = joiner.join();
            true
        }
        Err(_) => {
            warn!(queue = %label, thread = %name, "thread did not exit within timeout - detaching");
            false
        }
    }
}

/// Time left until `deadline`; `None` means unbounded.
#[must_use]
pub fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

/// Handles of threads owned by one queue.
#[derive(Debug, Default)]
pub struct WorkerHandles {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerHandles {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`.
    pub fn push(&self, handle: JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    /// Join and forget threads that already finished.
    pub fn reap(&self) {
        let finished: Vec<_> = {
            let mut handles = self.handles.lock();
            let (done, live): (Vec<_>, Vec<_>) = handles.drain(..).partition(JoinHandle::is_finished);
            *handles = live;
            done
        };
        for handle in finished {
            let _ = handle.join();
        }
    }

    /// Threads still tracked.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no thread is tracked.
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Join every tracked thread, giving up on the rest at `deadline`.
    ///
    /// Returns how many were joined; the rest are detached.
    pub fn join_all(&self, label: &str, deadline: Option<Instant>) -> usize {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let total = handles.len();
        let joined = handles
            .into_iter()
            .map(|handle| join_within(label, handle, remaining(deadline)))
            .filter(|joined| *joined)
            .count();
        debug!(queue = %label, joined, detached = total - joined, "threads joined");
        joined
    }
}
