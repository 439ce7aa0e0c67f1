//! Queue core shared by every variant, and the generic queue built on it.
//!
//! A variant is a [`Strategy`]: it owns storage and decides how items move
//! from "enqueued" to "executing". Everything else lives in [`QueueCore`]:
//!
//! - lifecycle flags (`paused`, `complete_marked`, `disposed`)
//! - the running bound bookkeeping used by `pause`
//! - the completion latch and observers
//! - the item runner wrapped around the [`CallbackSet`]
//!
//! [`ThreadQueue`] glues the two together and implements the public
//! operations once for all variants.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::callbacks::CallbackSet;
use super::cancel::CancellationContext;
use super::completion::{CompletionState, CompletionTracker};
use super::error::QueueError;
use super::observer::{Observer, Observers, QueueEvent};
use super::stats::{QueueCounters, QueueStats};
use super::token::Permit;
use crate::config::{QueueOptions, ThreadQueueMode};
use crate::infra::storage::MonitorStorage;

/// How long an enforced stop or dispose waits for running callbacks and threads.
pub(crate) const ABANDON_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Strategy seam
// ============================================================================

/// Storage and dispatch of one queue variant.
///
/// Implementations are driven by [`ThreadQueue`]; they never touch lifecycle
/// flags directly and report every item through [`QueueCore`].
pub trait Strategy<T: Send + 'static>: Sized + Send + Sync + 'static {
    /// Variant implemented by this strategy.
    const MODE: ThreadQueueMode;

    /// Build storage and admission primitives. Spawns nothing.
    ///
    /// # Errors
    ///
    /// `QueueError::NamedObject` when a named token cannot be opened or created.
    fn build(options: &QueueOptions<T>, threads: usize) -> Result<Self, QueueError>;

    /// Concurrency bound this strategy enforces.
    fn concurrency(&self) -> usize;

    /// Store an accepted item. Hands the item back if storage is closed.
    ///
    /// # Errors
    ///
    /// Returns the item when storage no longer accepts work.
    fn push(&self, item: T) -> Result<(), T>;

    /// Items waiting in storage.
    fn queued(&self) -> usize;

    /// Remove every queued item.
    fn drain(&self) -> Vec<T>;

    /// Wake blocked dispatchers so they re-check lifecycle flags.
    ///
    /// Called after completion is marked, on cancellation, on pause and on resume.
    fn wake(&self, core: &QueueCore<T>);

    /// Spawn the dispatcher or worker threads. Called once, on first enqueue.
    ///
    /// # Errors
    ///
    /// `QueueError::Spawn` when the OS refuses a thread.
    fn start(shared: &Arc<Shared<T, Self>>) -> Result<(), QueueError>;

    /// Join threads owned by the strategy, detaching those still alive at `deadline`.
    fn join(&self, label: &str, deadline: Option<Instant>);

    /// Monitor storage, for variants that expose queue inspection.
    fn storage(&self) -> Option<&MonitorStorage<T>> {
        None
    }
}

/// State shared between a queue handle and its threads.
pub struct Shared<T, S> {
    pub(crate) core: QueueCore<T>,
    pub(crate) strategy: S,
}

impl<T, S> fmt::Debug for Shared<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// QueueCore
// ============================================================================

/// Lifecycle, accounting and the item runner shared by all variants.
pub struct QueueCore<T> {
    label: String,
    mode: ThreadQueueMode,
    threads: usize,
    wait_on_dispose: bool,
    sleep_after_enqueue: Option<Duration>,
    threshold: Option<Duration>,
    callbacks: CallbackSet<T>,
    token: CancellationContext,
    /// Readers: enqueuers. Writer: `complete`.
    gate: RwLock<()>,
    pause_lock: Mutex<()>,
    pause_cvar: Condvar,
    paused: AtomicBool,
    running: AtomicUsize,
    complete_marked: AtomicBool,
    disposed: AtomicBool,
    started: AtomicBool,
    tracker: CompletionTracker,
    observers: Observers,
    counters: QueueCounters,
}

impl<T> QueueCore<T> {
    fn new(mode: ThreadQueueMode, threads: usize, options: QueueOptions<T>, ctx: &CancellationContext) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let observers = Observers::default();
        for (event, observer) in options.observers {
            observers.register(event, observer);
        }
        Self {
            label: format!("{mode}-{}", &id[..8]),
            mode,
            threads,
            wait_on_dispose: options.wait_on_dispose,
            sleep_after_enqueue: options.sleep_after_enqueue,
            threshold: options.threshold,
            callbacks: options.callbacks,
            token: CancellationContext::linked(&[ctx]),
            gate: RwLock::new(()),
            pause_lock: Mutex::new(()),
            pause_cvar: Condvar::new(),
            paused: AtomicBool::new(false),
            running: AtomicUsize::new(0),
            complete_marked: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            tracker: CompletionTracker::new(),
            observers,
            counters: QueueCounters::default(),
        }
    }

    /// Queue label used in thread names and log fields.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Effective concurrency bound.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    pub(crate) const fn threshold(&self) -> Option<Duration> {
        self.threshold
    }

    /// Internal context: trips with the caller's context or on an enforced stop.
    pub(crate) const fn token(&self) -> &CancellationContext {
        &self.token
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }

    pub(crate) fn is_complete_marked(&self) -> bool {
        self.complete_marked.load(Ordering::SeqCst)
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Next item from monitor storage, blocking while it is empty.
    ///
    /// Nothing is taken while paused. `None` once cancelled, or once
    /// completion is marked and storage is empty.
    pub(crate) fn next_item(&self, storage: &MonitorStorage<T>) -> Option<T> {
        storage.pop_wait(
            || self.is_canceled(),
            || self.paused.load(Ordering::SeqCst),
            || self.is_complete_marked(),
        )
    }

    // ---------------------------------------------------------------------
    // Pause / running bookkeeping
    // ---------------------------------------------------------------------

    /// Block while paused. Returns `false` once cancelled.
    pub(crate) fn wait_while_paused(&self) -> bool {
        let mut guard = self.pause_lock.lock();
        while self.paused.load(Ordering::SeqCst) && !self.is_canceled() {
            self.pause_cvar.wait(&mut guard);
        }
        !self.is_canceled()
    }

    /// Reserve a running slot, waiting while paused or while `bound` slots are taken.
    ///
    /// Returns `false` once cancelled; no slot is taken then.
    pub(crate) fn begin_run(&self, bound: Option<usize>) -> bool {
        let mut guard = self.pause_lock.lock();
        loop {
            if self.is_canceled() {
                return false;
            }
            let paused = self.paused.load(Ordering::SeqCst);
            let full = bound.is_some_and(|max| self.running.load(Ordering::SeqCst) >= max);
            if !paused && !full {
                break;
            }
            self.pause_cvar.wait(&mut guard);
        }
        self.running.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn end_run(&self) {
        let _guard = self.pause_lock.lock();
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.pause_cvar.notify_all();
    }

    fn set_paused(&self) {
        let _guard = self.pause_lock.lock();
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Block until running items finished, or until cancelled.
    fn wait_quiesced(&self) {
        let mut guard = self.pause_lock.lock();
        while self.running.load(Ordering::SeqCst) > 0 && !self.is_canceled() {
            self.pause_cvar.wait(&mut guard);
        }
    }

    fn resume(&self) {
        let _guard = self.pause_lock.lock();
        self.paused.store(false, Ordering::SeqCst);
        self.pause_cvar.notify_all();
    }

    /// Block until nothing is running.
    pub(crate) fn wait_idle(&self) {
        let mut guard = self.pause_lock.lock();
        while self.running.load(Ordering::SeqCst) > 0 {
            self.pause_cvar.wait(&mut guard);
        }
    }

    /// Block until nothing is running or `deadline` passes. Returns `true` when idle.
    pub(crate) fn wait_idle_until(&self, deadline: Instant) -> bool {
        let mut guard = self.pause_lock.lock();
        while self.running.load(Ordering::SeqCst) > 0 {
            if self.pause_cvar.wait_until(&mut guard, deadline).timed_out() {
                return self.running.load(Ordering::SeqCst) == 0;
            }
        }
        true
    }

    fn wake_all(&self) {
        {
            let _guard = self.pause_lock.lock();
            self.pause_cvar.notify_all();
        }
        self.tracker.wake();
    }

    // ---------------------------------------------------------------------
    // Item lifecycle
    // ---------------------------------------------------------------------

    /// Apply the scheduled callback. Rejected items are finished here.
    pub(crate) fn admit(&self, item: T) -> Option<T> {
        if self.callbacks.admit(&item) {
            return Some(item);
        }
        debug!(queue = %self.label, "item skipped by scheduled callback");
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        drop(item);
        self.finish_items(1);
        None
    }

    /// Run one item in a reserved slot (see [`QueueCore::begin_run`]).
    ///
    /// `permit` is held until the slot is given back.
    pub(crate) fn run_item(&self, item: T, permit: Option<Permit>) {
        let outcome = self.callbacks.run(item, &self.token);
        self.counters.record(outcome.result);
        if outcome.stop_requested {
            info!(queue = %self.label, "result callback requested stop");
            self.token.cancel();
        }
        self.end_run();
        drop(permit);
        self.finish_items(1);
    }

    /// Give back a slot whose item was lost before it could run.
    pub(crate) fn abort_run(&self) {
        self.end_run();
        self.counters.add_discarded(1);
        self.finish_items(1);
    }

    /// Drop items that will never be dispatched. No finalize.
    pub(crate) fn discard(&self, items: Vec<T>) -> usize {
        let n = items.len();
        if n > 0 {
            debug!(queue = %self.label, discarded = n, "discarding queued items");
            self.counters.add_discarded(n);
            drop(items);
            self.finish_items(n);
        }
        n
    }

    fn finish_items(&self, n: usize) {
        self.tracker.items_finished(n);
        self.signal_if_done();
    }

    fn worker_exited(&self) {
        self.tracker.worker_exited();
        self.signal_if_done();
    }

    fn signal_if_done(&self) {
        self.tracker.try_signal(|| {
            info!(queue = %self.label, "work completed");
            self.observers.publish(QueueEvent::WorkCompleted);
        });
    }
}

impl<T> fmt::Debug for QueueCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueCore")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("threads", &self.threads)
            .field("running", &self.running())
            .field("pending", &self.tracker.pending())
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

struct WorkerExit<'a, T>(&'a QueueCore<T>);

impl<T> Drop for WorkerExit<'_, T> {
    fn drop(&mut self) {
        self.0.worker_exited();
    }
}

/// Spawn a tracked worker thread running `body`.
///
/// The thread counts toward completion until `body` returns.
pub(crate) fn spawn_worker<T, S, F>(
    shared: &Arc<Shared<T, S>>,
    role: &str,
    index: usize,
    body: F,
) -> Result<JoinHandle<()>, QueueError>
where
    T: Send + 'static,
    S: Strategy<T>,
    F: FnOnce(&Arc<Shared<T, S>>) + Send + 'static,
{
    let core = &shared.core;
    core.tracker.worker_started();
    let worker = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("{}-{role}-{index}", core.label))
        .spawn(move || {
            let _exit = WorkerExit(&worker.core);
            debug!(queue = %worker.core.label, worker_id = index, "worker started");
            body(&worker);
            debug!(queue = %worker.core.label, worker_id = index, "worker stopped");
        });
    spawned.map_err(|e| {
        error!(queue = %core.label, worker_id = index, error = %e, "failed to spawn worker");
        core.worker_exited();
        QueueError::Spawn(e)
    })
}

// ============================================================================
// ThreadQueue
// ============================================================================

/// Producer/consumer queue generic over its variant.
///
/// Workers start on the first [`enqueue`](Self::enqueue). Dropping the queue
/// disposes it.
pub struct ThreadQueue<T: Send + 'static, S: Strategy<T>> {
    shared: Arc<Shared<T, S>>,
}

impl<T: Send + 'static, S: Strategy<T>> ThreadQueue<T, S> {
    /// Create a queue observing `ctx`.
    ///
    /// # Errors
    ///
    /// - `QueueError::Configuration` for invalid options
    /// - `QueueError::NamedObject` when a named token cannot be opened
    pub fn new(options: QueueOptions<T>, ctx: CancellationContext) -> Result<Self, QueueError> {
        options.validate()?;
        let strategy = S::build(&options, options.effective_threads())?;
        Ok(Self::with_strategy(options, &ctx, strategy))
    }

    /// Create a queue around an already built strategy.
    pub(crate) fn with_strategy(options: QueueOptions<T>, ctx: &CancellationContext, strategy: S) -> Self {
        let threads = strategy.concurrency();
        let core = QueueCore::new(S::MODE, threads, options, ctx);
        let shared = Arc::new(Shared { core, strategy });

        let weak = Arc::downgrade(&shared);
        shared.core.token.on_cancel(move || {
            if let Some(shared) = weak.upgrade() {
                debug!(queue = %shared.core.label, "cancellation observed");
                shared.strategy.wake(&shared.core);
                shared.core.wake_all();
            }
        });

        info!(queue = %shared.core.label, mode = %S::MODE, threads, "queue created");
        Self { shared }
    }

    #[cfg(test)]
    pub(crate) const fn shared(&self) -> &Arc<Shared<T, S>> {
        &self.shared
    }

    fn core(&self) -> &QueueCore<T> {
        &self.shared.core
    }

    fn ensure_live(&self) -> Result<(), QueueError> {
        if self.core().disposed.load(Ordering::SeqCst) {
            return Err(QueueError::disposed());
        }
        Ok(())
    }

    /// Add an item.
    ///
    /// # Errors
    ///
    /// - `QueueError::InvalidOperation` after `complete` or `dispose`
    /// - `QueueError::Canceled` once the queue's context has tripped
    /// - `QueueError::Spawn` when the first enqueue cannot start workers
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.ensure_live()?;
        let core = self.core();
        {
            let _gate = core.gate.read();
            if core.is_complete_marked() {
                return Err(QueueError::completion_marked());
            }
            if core.is_canceled() {
                return Err(QueueError::Canceled);
            }
            core.tracker.item_accepted();
            if let Err(item) = self.shared.strategy.push(item) {
                core.discard(vec![item]);
                return Err(QueueError::Canceled);
            }
            core.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        }

        self.ensure_started()?;

        if let Some(delay) = core.sleep_after_enqueue {
            core.token.wait_timeout(delay);
        }
        Ok(())
    }

    fn ensure_started(&self) -> Result<(), QueueError> {
        let core = self.core();
        if core
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if let Err(e) = S::start(&self.shared) {
            // Whatever did start drains nothing further; dispose discards the rest.
            core.token.cancel();
            return Err(e);
        }
        info!(queue = %core.label, "work started");
        core.observers.publish(QueueEvent::WorkStarted);
        Ok(())
    }

    /// Mark completion: no more items are accepted, queued items drain. Idempotent.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` after `dispose`.
    pub fn complete(&self) -> Result<(), QueueError> {
        self.ensure_live()?;
        self.mark_complete();
        Ok(())
    }

    fn mark_complete(&self) {
        let core = self.core();
        {
            let _gate = core.gate.write();
            if core.complete_marked.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        debug!(queue = %core.label, pending = core.tracker.pending(), "completion marked");
        core.tracker.mark_draining();
        self.shared.strategy.wake(core);
        core.signal_if_done();
    }

    /// Stop dispatching and block until nothing is running.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` if the variant cannot pause or the queue is disposed.
    pub fn pause(&self) -> Result<(), QueueError> {
        self.ensure_live()?;
        if !S::MODE.can_pause() {
            return Err(QueueError::not_pausable(S::MODE));
        }
        let core = self.core();
        core.set_paused();
        self.shared.strategy.wake(core);
        core.wait_quiesced();
        debug!(queue = %core.label, "paused");
        Ok(())
    }

    /// Resume dispatching after [`pause`](Self::pause).
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` if the variant cannot pause or the queue is disposed.
    pub fn resume(&self) -> Result<(), QueueError> {
        self.ensure_live()?;
        if !S::MODE.can_pause() {
            return Err(QueueError::not_pausable(S::MODE));
        }
        let core = self.core();
        core.resume();
        self.shared.strategy.wake(core);
        debug!(queue = %core.label, "resumed");
        Ok(())
    }

    /// Stop according to the dispose policy: drain if `wait_on_dispose`, else enforce.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` after `dispose`.
    pub fn stop(&self) -> Result<(), QueueError> {
        self.stop_with(!self.core().wait_on_dispose)
    }

    /// Complete, then either drain (`enforce == false`) or cancel and discard queued items.
    ///
    /// Returns once nothing is running. An enforced stop gives running
    /// callbacks at most 2 s and then returns without them.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` after `dispose`.
    pub fn stop_with(&self, enforce: bool) -> Result<(), QueueError> {
        self.ensure_live()?;
        let deadline = enforce.then(|| Instant::now() + ABANDON_TIMEOUT);
        self.stop_inner(enforce, deadline);
        Ok(())
    }

    /// `deadline` bounds the wait for running callbacks; `None` waits for all of them.
    fn stop_inner(&self, enforce: bool, deadline: Option<Instant>) {
        let core = self.core();
        info!(queue = %core.label, enforce, "stopping");
        core.resume();
        self.shared.strategy.wake(core);
        self.mark_complete();
        if !enforce {
            core.tracker.wait(None, &core.token);
        }
        core.token.cancel();
        core.discard(self.shared.strategy.drain());
        match deadline {
            Some(deadline) => {
                if !core.wait_idle_until(deadline) {
                    warn!(queue = %core.label, running = core.running(), "callbacks still running at stop deadline - abandoning them");
                }
            }
            None => core.wait_idle(),
        }
    }

    /// Block until completion fires. Returns `false` if cancelled first.
    pub fn wait(&self) -> bool {
        self.core().tracker.wait(None, &self.core().token)
    }

    /// Block until completion fires or `timeout` elapses. Returns `false` on timeout or cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.core().tracker.wait(Some(timeout), &self.core().token)
    }

    /// Discard every queued item. Running items are unaffected.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` after `dispose`.
    pub fn clear(&self) -> Result<usize, QueueError> {
        self.ensure_live()?;
        Ok(self.core().discard(self.shared.strategy.drain()))
    }

    fn monitor(&self) -> Result<&MonitorStorage<T>, QueueError> {
        self.ensure_live()?;
        self.shared.strategy.storage().ok_or_else(|| {
            QueueError::InvalidOperation(format!("{} queue storage cannot be inspected", S::MODE))
        })
    }

    /// Take the next queued item without running it.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` for blocking-buffer variants or after `dispose`.
    pub fn try_dequeue(&self) -> Result<Option<T>, QueueError> {
        let item = self.monitor()?.try_pop();
        if item.is_some() {
            self.core().finish_items(1);
        }
        Ok(item)
    }

    /// Clone of the next queued item.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` for blocking-buffer variants or after `dispose`.
    pub fn peek(&self) -> Result<Option<T>, QueueError>
    where
        T: Clone,
    {
        Ok(self.monitor()?.peek_with(T::clone))
    }

    /// Discard queued items from the front while `predicate` holds.
    ///
    /// # Errors
    ///
    /// `QueueError::InvalidOperation` for blocking-buffer variants or after `dispose`.
    pub fn remove_while<P>(&self, predicate: P) -> Result<usize, QueueError>
    where
        P: FnMut(&T) -> bool,
    {
        let removed = self.monitor()?.remove_while(predicate);
        Ok(self.core().discard(removed))
    }

    /// Stop per the dispose policy and release threads and handles. Idempotent.
    pub fn dispose(&self) {
        let core = self.core();
        if core.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        // One budget covers both the stop and the thread joins.
        let deadline = (!core.wait_on_dispose).then(|| Instant::now() + ABANDON_TIMEOUT);
        if !core.tracker.is_signaled() {
            let enforce = !core.wait_on_dispose || core.is_canceled();
            self.stop_inner(enforce, deadline);
        }
        core.token.cancel();
        self.shared.strategy.join(&core.label, deadline);
        info!(queue = %core.label, stats = ?self.stats(), "queue disposed");
    }

    /// Items queued or running.
    pub fn count(&self) -> usize {
        self.core().tracker.pending()
    }

    /// Items currently executing.
    pub fn running(&self) -> usize {
        self.core().running()
    }

    /// Whether storage holds no items.
    pub fn is_empty(&self) -> bool {
        self.shared.strategy.queued() == 0
    }

    /// Whether anything is queued or running.
    pub fn is_busy(&self) -> bool {
        self.count() > 0
    }

    /// Whether dispatch is paused.
    pub fn is_paused(&self) -> bool {
        self.core().is_paused()
    }

    /// Whether this variant supports `pause`/`resume`.
    pub const fn can_pause(&self) -> bool {
        S::MODE.can_pause()
    }

    /// Whether completion was marked.
    pub fn is_completed(&self) -> bool {
        self.core().is_complete_marked()
    }

    /// Whether completion has fired.
    pub fn is_signaled(&self) -> bool {
        self.core().tracker.state() == CompletionState::Signaled
    }

    /// Whether the queue was disposed.
    pub fn is_disposed(&self) -> bool {
        self.core().disposed.load(Ordering::SeqCst)
    }

    /// Effective concurrency bound.
    pub fn threads(&self) -> usize {
        self.core().threads
    }

    /// Variant of this queue.
    pub const fn mode(&self) -> ThreadQueueMode {
        S::MODE
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> QueueStats {
        let core = self.core();
        core.counters.snapshot(
            S::MODE,
            core.threads,
            self.shared.strategy.queued(),
            core.running(),
            core.tracker.is_signaled(),
        )
    }

    /// Observe the work-started transition.
    pub fn on_work_started<F>(&self, f: F)
    where
        F: Fn(QueueEvent) + Send + Sync + 'static,
    {
        self.core().observers.register(QueueEvent::WorkStarted, Arc::new(f));
    }

    /// Observe the work-completed transition.
    pub fn on_work_completed<F>(&self, f: F)
    where
        F: Fn(QueueEvent) + Send + Sync + 'static,
    {
        self.core().observers.register(QueueEvent::WorkCompleted, Arc::new(f));
    }

    /// Channel receiving every lifecycle event published from now on.
    pub fn subscribe(&self) -> Receiver<QueueEvent> {
        self.core().observers.subscribe()
    }
}

impl<T: Send + 'static, S: Strategy<T>> Drop for ThreadQueue<T, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Send + 'static, S: Strategy<T>> fmt::Debug for ThreadQueue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadQueue")
            .field("core", &self.shared.core)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Object-safe contract
// ============================================================================

/// Object-safe view of any queue variant, returned by
/// [`create_queue`](crate::queues::create_queue).
pub trait ProducerConsumer<T>: Send + Sync + fmt::Debug {
    /// See [`ThreadQueue::enqueue`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::enqueue`].
    fn enqueue(&self, item: T) -> Result<(), QueueError>;
    /// See [`ThreadQueue::complete`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::complete`].
    fn complete(&self) -> Result<(), QueueError>;
    /// See [`ThreadQueue::pause`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::pause`].
    fn pause(&self) -> Result<(), QueueError>;
    /// See [`ThreadQueue::resume`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::resume`].
    fn resume(&self) -> Result<(), QueueError>;
    /// See [`ThreadQueue::stop`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::stop`].
    fn stop(&self) -> Result<(), QueueError>;
    /// See [`ThreadQueue::stop_with`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::stop_with`].
    fn stop_with(&self, enforce: bool) -> Result<(), QueueError>;
    /// See [`ThreadQueue::wait`].
    fn wait(&self) -> bool;
    /// See [`ThreadQueue::wait_timeout`].
    fn wait_timeout(&self, timeout: Duration) -> bool;
    /// See [`ThreadQueue::clear`].
    ///
    /// # Errors
    ///
    /// As [`ThreadQueue::clear`].
    fn clear(&self) -> Result<usize, QueueError>;
    /// See [`ThreadQueue::dispose`].
    fn dispose(&self);
    /// See [`ThreadQueue::count`].
    fn count(&self) -> usize;
    /// See [`ThreadQueue::running`].
    fn running(&self) -> usize;
    /// See [`ThreadQueue::is_empty`].
    fn is_empty(&self) -> bool;
    /// See [`ThreadQueue::is_busy`].
    fn is_busy(&self) -> bool;
    /// See [`ThreadQueue::is_paused`].
    fn is_paused(&self) -> bool;
    /// See [`ThreadQueue::can_pause`].
    fn can_pause(&self) -> bool;
    /// See [`ThreadQueue::is_completed`].
    fn is_completed(&self) -> bool;
    /// See [`ThreadQueue::is_disposed`].
    fn is_disposed(&self) -> bool;
    /// See [`ThreadQueue::threads`].
    fn threads(&self) -> usize;
    /// See [`ThreadQueue::mode`].
    fn mode(&self) -> ThreadQueueMode;
    /// See [`ThreadQueue::stats`].
    fn stats(&self) -> QueueStats;
    /// Register an observer for `event`.
    fn observe(&self, event: QueueEvent, observer: Observer);
    /// See [`ThreadQueue::subscribe`].
    fn subscribe(&self) -> Receiver<QueueEvent>;
}

impl<T: Send + 'static, S: Strategy<T>> ProducerConsumer<T> for ThreadQueue<T, S> {
    fn enqueue(&self, item: T) -> Result<(), QueueError> {
        Self::enqueue(self, item)
    }

    fn complete(&self) -> Result<(), QueueError> {
        Self::complete(self)
    }

    fn pause(&self) -> Result<(), QueueError> {
        Self::pause(self)
    }

    fn resume(&self) -> Result<(), QueueError> {
        Self::resume(self)
    }

    fn stop(&self) -> Result<(), QueueError> {
        Self::stop(self)
    }

    fn stop_with(&self, enforce: bool) -> Result<(), QueueError> {
        Self::stop_with(self, enforce)
    }

    fn wait(&self) -> bool {
        Self::wait(self)
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        Self::wait_timeout(self, timeout)
    }

    fn clear(&self) -> Result<usize, QueueError> {
        Self::clear(self)
    }

    fn dispose(&self) {
        Self::dispose(self);
    }

    fn count(&self) -> usize {
        Self::count(self)
    }

    fn running(&self) -> usize {
        Self::running(self)
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn is_busy(&self) -> bool {
        Self::is_busy(self)
    }

    fn is_paused(&self) -> bool {
        Self::is_paused(self)
    }

    fn can_pause(&self) -> bool {
        Self::can_pause(self)
    }

    fn is_completed(&self) -> bool {
        Self::is_completed(self)
    }

    fn is_disposed(&self) -> bool {
        Self::is_disposed(self)
    }

    fn threads(&self) -> usize {
        Self::threads(self)
    }

    fn mode(&self) -> ThreadQueueMode {
        Self::mode(self)
    }

    fn stats(&self) -> QueueStats {
        Self::stats(self)
    }

    fn observe(&self, event: QueueEvent, observer: Observer) {
        self.core().observers.register(event, observer);
    }

    fn subscribe(&self) -> Receiver<QueueEvent> {
        Self::subscribe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionResult;

    /// Minimal strategy: storage only, items are run inline by a single worker.
    struct Inline {
        storage: MonitorStorage<u32>,
        workers: Mutex<Vec<JoinHandle<()>>>,
    }

    impl Strategy<u32> for Inline {
        const MODE: ThreadQueueMode = ThreadQueueMode::Dedicated;

        fn build(_options: &QueueOptions<u32>, _threads: usize) -> Result<Self, QueueError> {
            Ok(Self {
                storage: MonitorStorage::new(),
                workers: Mutex::new(Vec::new()),
            })
        }

        fn concurrency(&self) -> usize {
            1
        }

        fn push(&self, item: u32) -> Result<(), u32> {
            self.storage.push(item);
            Ok(())
        }

        fn queued(&self) -> usize {
            self.storage.len()
        }

        fn drain(&self) -> Vec<u32> {
            self.storage.drain()
        }

        fn wake(&self, _core: &QueueCore<u32>) {
            self.storage.wake_all();
        }

        fn start(shared: &Arc<Shared<u32, Self>>) -> Result<(), QueueError> {
            let handle = spawn_worker(shared, "inline", 0, |shared| {
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
            })?;
            shared.strategy.workers.lock().push(handle);
            Ok(())
        }

        fn join(&self, _label: &str, _deadline: Option<Instant>) {
            for handle in self.workers.lock().drain(..) {
                let _ = handle.join();
            }
        }

        fn storage(&self) -> Option<&MonitorStorage<u32>> {
            Some(&self.storage)
        }
    }

    fn queue(options: QueueOptions<u32>) -> ThreadQueue<u32, Inline> {
        ThreadQueue::new(options, CancellationContext::new()).unwrap()
    }

    fn succeed() -> QueueOptions<u32> {
        QueueOptions::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success))
    }

    #[test]
    fn test_complete_before_enqueue_fires() {
        let q = queue(succeed());
        q.complete().unwrap();
        assert!(q.wait_timeout(Duration::from_secs(1)));
        assert!(matches!(q.enqueue(1), Err(QueueError::InvalidOperation(_))));
    }

    #[test]
    fn test_drain_then_complete() {
        let q = queue(succeed());
        for i in 0..10 {
            q.enqueue(i).unwrap();
        }
        q.complete().unwrap();
        assert!(q.wait_timeout(Duration::from_secs(5)));
        assert_eq!(q.count(), 0);
        assert_eq!(q.stats().succeeded, 10);
    }

    #[test]
    fn test_use_after_dispose_fails() {
        let q = queue(succeed());
        q.dispose();
        assert!(q.is_disposed());
        assert!(matches!(q.enqueue(1), Err(QueueError::InvalidOperation(_))));
        assert!(matches!(q.complete(), Err(QueueError::InvalidOperation(_))));
        q.dispose();
    }

    #[test]
    fn test_skipped_items_finish() {
        let q = queue(succeed().with_scheduled(|item: &u32| item % 2 == 0));
        for i in 0..6 {
            q.enqueue(i).unwrap();
        }
        q.complete().unwrap();
        assert!(q.wait_timeout(Duration::from_secs(5)));
        let stats = q.stats();
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.executed, 3);
    }

    #[test]
    fn test_completion_observer_can_wait() {
        let q = Arc::new(queue(succeed()));
        let weak = Arc::downgrade(&q);
        let (tx, rx) = crossbeam_channel::bounded(1);
        q.on_work_completed(move |_| {
            let Some(q) = weak.upgrade() else { return };
            let done = q.wait_timeout(Duration::from_secs(5));
            drop(q);
            let _ = tx.send(done);
        });
        q.enqueue(1).unwrap();
        q.complete().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(q.is_signaled());
    }

    #[test]
    fn test_enforced_stop_gives_up_on_stuck_callback() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let q = queue(QueueOptions::new(move |_: &u32, _: &CancellationContext| {
            while !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(ExecutionResult::Success)
        }));
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while q.running() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(q.running(), 1);

        let started = Instant::now();
        q.stop_with(true).unwrap();
        assert!(started.elapsed() < ABANDON_TIMEOUT + Duration::from_millis(500));
        assert_eq!(q.running(), 1);
        assert_eq!(q.count(), 1);

        release.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !q.is_signaled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(q.is_signaled());
        assert_eq!(q.count(), 0);
        assert_eq!(q.stats().discarded, 1);
    }

    #[test]
    fn test_disposed_queues_release_caller_context() {
        let ctx = CancellationContext::new();
        for i in 0..200 {
            let q: ThreadQueue<u32, Inline> = ThreadQueue::new(succeed(), ctx.clone()).unwrap();
            q.enqueue(i).unwrap();
            q.complete().unwrap();
            assert!(q.wait_timeout(Duration::from_secs(5)));
        }
        assert_eq!(ctx.hook_count(), 0);
    }

    #[test]
    fn test_caller_cancel_rejects_enqueue() {
        let ctx = CancellationContext::new();
        let q: ThreadQueue<u32, Inline> = ThreadQueue::new(succeed(), ctx.clone()).unwrap();
        ctx.cancel();
        assert!(matches!(q.enqueue(1), Err(QueueError::Canceled)));
        assert!(!q.wait());
    }
}
