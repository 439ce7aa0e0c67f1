//! Pluggable callbacks that define what work is, and the per-item runner.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cancel::CancellationContext;
use super::error::TaskError;

/// Outcome of one execute call, produced exactly once per dispatched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The item was processed.
    Success,
    /// The item observed cancellation.
    Canceled,
    /// The item ran out of time.
    Timeout,
    /// The item failed.
    Error,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Execute callback: processes one item.
pub type ExecuteFn<T> =
    Arc<dyn Fn(&T, &CancellationContext) -> Result<ExecutionResult, TaskError> + Send + Sync>;
/// Result callback: receives every outcome, returns `false` to stop dispatching.
pub type ResultFn<T> = Arc<dyn Fn(&T, ExecutionResult, Option<&TaskError>) -> bool + Send + Sync>;
/// Scheduled callback: returns `false` to skip an item before it runs.
pub type ScheduledFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
/// Finalize callback: takes ownership of the item once it has been processed.
pub type FinalizeFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// The four functions that define the work; the queue never inspects items itself.
pub struct CallbackSet<T> {
    /// Required execute callback.
    pub execute: ExecuteFn<T>,
    /// Optional result callback.
    pub result: Option<ResultFn<T>>,
    /// Optional admission callback.
    pub scheduled: Option<ScheduledFn<T>>,
    /// Optional finalize callback.
    pub finalize: Option<FinalizeFn<T>>,
}

impl<T> Clone for CallbackSet<T> {
    fn clone(&self) -> Self {
        Self {
            execute: Arc::clone(&self.execute),
            result: self.result.clone(),
            scheduled: self.scheduled.clone(),
            finalize: self.finalize.clone(),
        }
    }
}

impl<T> fmt::Debug for CallbackSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("result", &self.result.is_some())
            .field("scheduled", &self.scheduled.is_some())
            .field("finalize", &self.finalize.is_some())
            .finish_non_exhaustive()
    }
}

/// What happened to one dispatched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ItemOutcome {
    pub result: ExecutionResult,
    /// The result callback asked the queue to stop.
    pub stop_requested: bool,
}

impl<T> CallbackSet<T> {
    /// Create a callback set from an execute function.
    pub fn new<F>(execute: F) -> Self
    where
        F: Fn(&T, &CancellationContext) -> Result<ExecutionResult, TaskError> + Send + Sync + 'static,
    {
        Self {
            execute: Arc::new(execute),
            result: None,
            scheduled: None,
            finalize: None,
        }
    }

    /// Ask the scheduled callback whether `item` may run.
    pub(crate) fn admit(&self, item: &T) -> bool {
        let Some(scheduled) = &self.scheduled else {
            return true;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| scheduled(item))) {
            Ok(admit) => admit,
            Err(payload) => {
                warn!(panic = %panic_message(payload.as_ref()), "scheduled callback panicked, skipping item");
                false
            }
        }
    }

    /// Execute one item, route its outcome and finalize it.
    pub(crate) fn run(&self, item: T, ctx: &CancellationContext) -> ItemOutcome {
        let (result, error) =
            match panic::catch_unwind(AssertUnwindSafe(|| (self.execute)(&item, ctx))) {
                Ok(Ok(result)) => (result, None),
                Ok(Err(err)) => (classify(&err), Some(err)),
                Err(payload) => (
                    ExecutionResult::Error,
                    Some(TaskError::Panicked(panic_message(payload.as_ref()))),
                ),
            };

        let mut stop_requested = false;
        if let Some(callback) = &self.result {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&item, result, error.as_ref()))) {
                Ok(keep_going) => stop_requested = !keep_going,
                Err(payload) => {
                    warn!(panic = %panic_message(payload.as_ref()), "result callback panicked");
                }
            }
        }

        self.finalize(item);
        ItemOutcome {
            result,
            stop_requested,
        }
    }

    /// Hand an item to the finalize callback, if any.
    pub(crate) fn finalize(&self, item: T) {
        let Some(finalize) = &self.finalize else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| finalize(item))) {
            warn!(panic = %panic_message(payload.as_ref()), "finalize callback panicked");
        }
    }
}

const fn classify(err: &TaskError) -> ExecutionResult {
    match err {
        TaskError::Canceled => ExecutionResult::Canceled,
        TaskError::Timeout => ExecutionResult::Timeout,
        TaskError::Failed(_) | TaskError::Panicked(_) => ExecutionResult::Error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<(u32, ExecutionResult, Option<String>)>>>;

    fn recording(execute: impl Fn(&u32) -> Result<ExecutionResult, TaskError> + Send + Sync + 'static) -> (CallbackSet<u32>, Log, Arc<Mutex<Vec<u32>>>) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let finalized = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = CallbackSet::new(move |item: &u32, _ctx: &CancellationContext| execute(item));
        let sink = Arc::clone(&log);
        callbacks.result = Some(Arc::new(move |item: &u32, result: ExecutionResult, err: Option<&TaskError>| {
            sink.lock().push((*item, result, err.map(ToString::to_string)));
            true
        }));
        let done = Arc::clone(&finalized);
        callbacks.finalize = Some(Arc::new(move |item: u32| done.lock().push(item)));
        (callbacks, log, finalized)
    }

    #[test]
    fn test_errors_are_classified() {
        let (callbacks, log, finalized) = recording(|item| match item {
            1 => Ok(ExecutionResult::Success),
            2 => Err(TaskError::Timeout),
            3 => Err(TaskError::Canceled),
            _ => Err(anyhow::anyhow!("boom").into()),
        });
        let ctx = CancellationContext::new();
        for item in 1..=4 {
            callbacks.run(item, &ctx);
        }

        let log = log.lock();
        assert_eq!(log[0], (1, ExecutionResult::Success, None));
        assert_eq!(log[1].1, ExecutionResult::Timeout);
        assert_eq!(log[2].1, ExecutionResult::Canceled);
        assert_eq!(log[3], (4, ExecutionResult::Error, Some("task failed: boom".into())));
        assert_eq!(*finalized.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_panic_becomes_error() {
        let (callbacks, log, finalized) = recording(|_| panic!("kaboom"));
        let outcome = callbacks.run(7, &CancellationContext::new());

        assert_eq!(outcome.result, ExecutionResult::Error);
        assert_eq!(log.lock()[0].2.as_deref(), Some("task panicked: kaboom"));
        assert_eq!(*finalized.lock(), vec![7]);
    }

    #[test]
    fn test_result_callback_can_stop() {
        let mut callbacks = CallbackSet::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success));
        callbacks.result = Some(Arc::new(|_: &u32, _: ExecutionResult, _: Option<&TaskError>| false));
        let outcome = callbacks.run(1, &CancellationContext::new());
        assert!(outcome.stop_requested);
    }

    #[test]
    fn test_admit_defaults_to_true() {
        let mut callbacks = CallbackSet::new(|_: &u32, _: &CancellationContext| Ok(ExecutionResult::Success));
        assert!(callbacks.admit(&3));
        callbacks.scheduled = Some(Arc::new(|item: &u32| item % 2 == 0));
        assert!(!callbacks.admit(&3));
        assert!(callbacks.admit(&4));
    }
}
