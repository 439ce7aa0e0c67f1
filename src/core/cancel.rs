//! Cooperative cancellation shared by callers, queues and workers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Hooks {
    next_id: u64,
    pending: Vec<(u64, Hook)>,
}

#[derive(Default)]
struct Inner {
    canceled: AtomicBool,
    hooks: Mutex<Hooks>,
    cvar: Condvar,
    /// Hooks this context holds on its sources, removed when it is dropped.
    links: Mutex<Vec<(Weak<Inner>, u64)>>,
}

impl Inner {
    fn cancel(&self) -> bool {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let pending = {
            let mut hooks = self.hooks.lock();
            self.cvar.notify_all();
            std::mem::take(&mut hooks.pending)
        };
        for (_, hook) in pending {
            hook();
        }
        true
    }

    /// Store `hook` unless already cancelled, in which case it is handed back.
    fn register(&self, hook: Hook) -> Result<u64, Hook> {
        let mut hooks = self.hooks.lock();
        if self.canceled.load(Ordering::Acquire) {
            return Err(hook);
        }
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.pending.push((id, hook));
        Ok(id)
    }

    fn unregister(&self, id: u64) {
        let removed = {
            let mut hooks = self.hooks.lock();
            hooks
                .pending
                .iter()
                .position(|(hook_id, _)| *hook_id == id)
                .map(|at| hooks.pending.swap_remove(at))
        };
        drop(removed);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (source, id) in self.links.get_mut().drain(..) {
            if let Some(source) = source.upgrade() {
                source.unregister(id);
            }
        }
    }
}

/// Cancellation handle observed by every blocking point of a queue.
///
/// Clones share the same state. A context can be derived from several
/// sources with [`CancellationContext::linked`]; it trips as soon as any
/// source trips, while cancelling the derived context leaves the sources alone.
///
/// Cancellation is advisory: nothing is aborted, waits return early and
/// loops stop pulling work.
#[derive(Clone, Default)]
pub struct CancellationContext {
    inner: Arc<Inner>,
}

impl CancellationContext {
    /// Create a fresh, untriggered context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that trips when any of `sources` trips.
    ///
    /// Sources only keep a registration while the linked context is alive.
    #[must_use]
    pub fn linked(sources: &[&Self]) -> Self {
        let linked = Self::new();
        for source in sources {
            let weak: Weak<Inner> = Arc::downgrade(&linked.inner);
            let hook: Hook = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.cancel();
                }
            });
            match source.inner.register(hook) {
                Ok(id) => linked.inner.links.lock().push((Arc::downgrade(&source.inner), id)),
                Err(hook) => hook(),
            }
        }
        linked
    }

    /// Create a child context: cancelled with `self`, cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::linked(&[self])
    }

    /// Trigger cancellation. Returns `true` only for the call that tripped it.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Whether cancellation has been triggered.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Run `hook` once when the context trips, or immediately if it already has.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(hook) = self.inner.register(Box::new(hook)) {
            hook();
        }
    }

    /// Hooks waiting for this context to trip.
    #[cfg(test)]
    pub(crate) fn hook_count(&self) -> usize {
        self.inner.hooks.lock().pending.len()
    }

    /// Block until cancelled or `timeout` elapses. Returns `true` when cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut hooks = self.inner.hooks.lock();
        while !self.is_canceled() {
            if self.inner.cvar.wait_until(&mut hooks, deadline).timed_out() {
                return self.is_canceled();
            }
        }
        true
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let mut hooks = self.inner.hooks.lock();
        while !self.is_canceled() {
            self.inner.cvar.wait(&mut hooks);
        }
    }
}

impl fmt::Debug for CancellationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationContext")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}
