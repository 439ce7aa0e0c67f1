//! Single-fire "all work done" latch.
//!
//! Two counters feed one atomic state machine:
//!
//! - `pending`: items accepted by `enqueue` and not yet finished (queued or running)
//! - `workers`: dispatcher/worker threads still alive
//!
//! ```text
//! Active --complete()--> Draining --(pending == 0 && workers == 0, CAS)--> AllExited --> Signaled
//! ```
//!
//! The completion callback runs after `Signaled` is stored, so it may call
//! [`CompletionTracker::wait`] without blocking on itself.
//!
//! Every finisher decrements its own counter and then runs the check. Counters are
//! read after the decrement with `SeqCst`, so of two racing last finishers at least
//! one observes both counters at zero, and the `Draining -> AllExited` CAS lets only
//! one of them fire.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::cancel::CancellationContext;

const ACTIVE: u8 = 0;
const DRAINING: u8 = 1;
const ALL_EXITED: u8 = 2;
const SIGNALED: u8 = 3;

/// Observable phase of a [`CompletionTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// Accepting work.
    Active,
    /// Completion marked, finishing accepted work.
    Draining,
    /// Everything finished; waiters are being released.
    AllExited,
    /// Completion has fired and waiters were released.
    Signaled,
}

/// Race-free single-fire completion latch.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    state: AtomicU8,
    pending: AtomicUsize,
    workers: AtomicUsize,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl CompletionTracker {
    /// Create a tracker in the `Active` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> CompletionState {
        match self.state.load(Ordering::SeqCst) {
            ACTIVE => CompletionState::Active,
            DRAINING => CompletionState::Draining,
            ALL_EXITED => CompletionState::AllExited,
            _ => CompletionState::Signaled,
        }
    }

    /// Whether completion has fired.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SIGNALED
    }

    /// Items accepted and not finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Worker threads still alive.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// Count a newly accepted item.
    pub fn item_accepted(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Count `n` items as finished (processed, skipped or discarded).
    pub fn items_finished(&self, n: usize) {
        if n > 0 {
            self.pending.fetch_sub(n, Ordering::SeqCst);
        }
    }

    /// Count a worker thread about to start.
    pub fn worker_started(&self) {
        self.workers.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a worker thread that has left its loop.
    pub fn worker_exited(&self) {
        self.workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Enter `Draining`. Idempotent.
    pub fn mark_draining(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, DRAINING, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Fire `on_complete` if draining and nothing is left. Returns `true` for the one caller that fired.
    pub fn try_signal<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce(),
    {
        if self.state.load(Ordering::SeqCst) != DRAINING
            || self.pending.load(Ordering::SeqCst) != 0
            || self.workers.load(Ordering::SeqCst) != 0
        {
            return false;
        }
        if self
            .state
            .compare_exchange(DRAINING, ALL_EXITED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        {
            let _guard = self.lock.lock();
            self.state.store(SIGNALED, Ordering::SeqCst);
            self.cvar.notify_all();
        }
        on_complete();
        true
    }

    /// Wake waiters so they re-check cancellation.
    pub fn wake(&self) {
        let _guard = self.lock.lock();
        self.cvar.notify_all();
    }

    /// Block until signaled, `timeout` elapses or `ctx` is cancelled.
    ///
    /// Returns `true` only when completion fired.
    pub fn wait(&self, timeout: Option<Duration>, ctx: &CancellationContext) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock();
        loop {
            if self.is_signaled() {
                return true;
            }
            if ctx.is_canceled() {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut guard, deadline).timed_out() {
                        return self.is_signaled();
                    }
                }
                None => self.cvar.wait(&mut guard),
            }
        }
    }
}
