//! Shared worker thread pool.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::workers::{spawn_named, WorkerHandles};
use crate::core::{QueueError, ABANDON_TIMEOUT};

/// Unit of work posted to a [`Spawn`] implementation.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs on threads it owns.
pub trait Spawn: Send + Sync + fmt::Debug {
    /// Post `job`. Hands it back when the pool no longer accepts work.
    ///
    /// # Errors
    ///
    /// Returns the job if the pool was shut down.
    fn spawn(&self, job: Job) -> Result<(), Job>;
}

/// Fixed set of worker threads draining one job channel.
///
/// Construct it once and share it by `Arc` between queues. Workers exit when
/// the pool is shut down or dropped.
pub struct WorkerThreadPool {
    name: String,
    job_tx: Mutex<Option<Sender<Job>>>,
    workers: WorkerHandles,
    shutdown: AtomicBool,
}

impl WorkerThreadPool {
    /// Start `size` workers (processor count for 0).
    ///
    /// # Errors
    ///
    /// `QueueError::Spawn` when a worker thread cannot be created.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self, QueueError> {
        let name = name.into();
        let size = if size == 0 { num_cpus::get() } else { size };
        let (job_tx, job_rx) = unbounded::<Job>();
        let pool = Self {
            name,
            job_tx: Mutex::new(Some(job_tx)),
            workers: WorkerHandles::new(),
            shutdown: AtomicBool::new(false),
        };
        for id in 0..size {
            let rx = job_rx.clone();
            let label = pool.name.clone();
            let handle = spawn_named(format!("{}-{id}", pool.name), move || worker_loop(&label, id, &rx))?;
            pool.workers.push(handle);
        }
        info!(pool = %pool.name, workers = size, "worker thread pool started");
        Ok(pool)
    }

    /// Pool sized to the processor count.
    ///
    /// # Errors
    ///
    /// `QueueError::Spawn` when a worker thread cannot be created.
    pub fn with_default_size() -> Result<Self, QueueError> {
        Self::new("tq-pool", 0)
    }

    /// Worker threads still tracked.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs queued but not yet picked up.
    pub fn backlog(&self) -> usize {
        self.job_tx.lock().as_ref().map_or(0, Sender::len)
    }

    /// Stop accepting jobs and join workers, detaching any that do not exit within 2 s.
    pub fn shutdown(&self) {
        self.shutdown_by(Some(Instant::now() + ABANDON_TIMEOUT));
    }

    /// Stop accepting jobs and join workers, detaching any still busy at `deadline`.
    pub fn shutdown_by(&self, deadline: Option<Instant>) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pool = %self.name, "shutting down worker thread pool");
        // Dropping the sender lets workers finish the backlog and exit.
        self.job_tx.lock().take();
        let joined = self.workers.join_all(&self.name, deadline);
        info!(pool = %self.name, joined, "worker thread pool shut down");
    }
}

impl Spawn for WorkerThreadPool {
    fn spawn(&self, job: Job) -> Result<(), Job> {
        match self.job_tx.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }
}

impl Drop for WorkerThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThreadPool")
            .field("name", &self.name)
            .field("workers", &self.workers.len())
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_loop(pool: &str, id: usize, rx: &Receiver<Job>) {
    debug!(pool = %pool, worker_id = id, "pool worker started");
    while let Ok(job) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(pool = %pool, worker_id = id, "pool job panicked");
        }
    }
    debug!(pool = %pool, worker_id = id, "pool worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_runs_jobs() {
        let pool = WorkerThreadPool::new("test-pool", 2).unwrap();
        let (tx, rx) = unbounded();
        for i in 0..10 {
            let tx = tx.clone();
            assert!(pool.spawn(Box::new(move || tx.send(i).unwrap())).is_ok());
        }
        let mut seen: Vec<i32> = (0..10).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_shutdown_rejects_jobs() {
        let pool = WorkerThreadPool::new("test-pool", 1).unwrap();
        pool.shutdown();
        assert!(pool.spawn(Box::new(|| {})).is_err());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerThreadPool::new("test-pool", 1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        assert!(pool.spawn(Box::new(|| panic!("job failure"))).is_ok());
        let counter = Arc::clone(&ran);
        assert!(pool
            .spawn(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .is_ok());
        pool.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
