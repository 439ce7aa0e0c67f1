//! Queue statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::callbacks::ExecutionResult;
use crate::config::ThreadQueueMode;

/// Point-in-time view of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue variant.
    pub mode: ThreadQueueMode,
    /// Effective concurrency bound.
    pub threads: usize,
    /// Items waiting in storage.
    pub queued: usize,
    /// Items currently executing.
    pub running: usize,
    /// Items accepted by `enqueue`.
    pub enqueued: u64,
    /// Items that reached execute.
    pub executed: u64,
    /// Items that finished with `Success`.
    pub succeeded: u64,
    /// Items that finished with `Error`.
    pub failed: u64,
    /// Items that finished with `Canceled`.
    pub canceled: u64,
    /// Items that finished with `Timeout`.
    pub timed_out: u64,
    /// Items rejected by the scheduled callback.
    pub skipped: u64,
    /// Items dropped without being dispatched.
    pub discarded: u64,
    /// Whether completion has fired.
    pub completed: bool,
}

/// Internal counters for queue statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub enqueued: AtomicU64,
    pub executed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub canceled: AtomicU64,
    pub timed_out: AtomicU64,
    pub skipped: AtomicU64,
    pub discarded: AtomicU64,
}

impl QueueCounters {
    pub fn record(&self, result: ExecutionResult) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            ExecutionResult::Success => &self.succeeded,
            ExecutionResult::Error => &self.failed,
            ExecutionResult::Canceled => &self.canceled,
            ExecutionResult::Timeout => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_discarded(&self, n: usize) {
        self.discarded.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(
        &self,
        mode: ThreadQueueMode,
        threads: usize,
        queued: usize,
        running: usize,
        completed: bool,
    ) -> QueueStats {
        QueueStats {
            mode,
            threads,
            queued,
            running,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            completed,
        }
    }
}
