//! Plain queue plus monitor.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// FIFO storage with a condition variable signalled on every push.
pub struct MonitorStorage<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> MonitorStorage<T> {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one waiter.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Pop the front item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Pop up to `max` items without blocking.
    pub fn pop_batch(&self, max: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    /// Block until an item is available and may be taken.
    ///
    /// Returns `None` as soon as `canceled` holds, or once `closed` holds and
    /// storage is empty. While `held` holds nothing is taken. The predicates
    /// are evaluated under the storage lock, so a waker that flips them and
    /// then calls [`wake_all`](Self::wake_all) is never missed.
    pub fn pop_wait<C, H, D>(&self, canceled: C, held: H, closed: D) -> Option<T>
    where
        C: Fn() -> bool,
        H: Fn() -> bool,
        D: Fn() -> bool,
    {
        let mut items = self.items.lock();
        loop {
            if canceled() {
                return None;
            }
            if !held() {
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if closed() {
                    return None;
                }
            }
            self.available.wait(&mut items);
        }
    }

    /// Apply `f` to the front item.
    pub fn peek_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.items.lock().front().map(f)
    }

    /// Remove items from the front while `predicate` holds.
    pub fn remove_while<P>(&self, mut predicate: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock();
        let n = items.iter().take_while(|item| predicate(item)).count();
        items.drain(..n).collect()
    }

    /// Remove every item.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Items currently stored.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether storage is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wake every waiter so it re-evaluates its predicates.
    pub fn wake_all(&self) {
        let _items = self.items.lock();
        self.available.notify_all();
    }
}

impl<T> Default for MonitorStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MonitorStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorStorage")
            .field("len", &self.len())
            .finish()
    }
}
