//! Work-started / work-completed notifications.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle transition published by a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEvent {
    /// Dispatch started (first enqueue).
    WorkStarted,
    /// Completion fired: marked complete, nothing queued, nothing running.
    WorkCompleted,
}

/// Observer callback.
pub type Observer = Arc<dyn Fn(QueueEvent) + Send + Sync>;

/// Registered observers and channel subscribers.
///
/// The queue calls [`Observers::publish`] at most once per transition; this
/// type only fans the event out.
#[derive(Default)]
pub struct Observers {
    callbacks: Mutex<Vec<(QueueEvent, Observer)>>,
    subscribers: Mutex<Vec<Sender<QueueEvent>>>,
}

impl Observers {
    /// Register `observer` for `event`.
    pub fn register(&self, event: QueueEvent, observer: Observer) {
        self.callbacks.lock().push((event, observer));
    }

    /// Open a channel receiving every event published from now on.
    pub fn subscribe(&self) -> Receiver<QueueEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to matching observers and live subscribers.
    pub fn publish(&self, event: QueueEvent) {
        // Snapshot so observers may register more observers.
        let callbacks: Vec<Observer> = self
            .callbacks
            .lock()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(?event, "queue observer panicked");
            }
        }

        self.subscribers
            .lock()
            .retain(|tx| tx.send(event).is_ok());
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("callbacks", &self.callbacks.lock().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
