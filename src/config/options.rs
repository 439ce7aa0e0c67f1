//! Immutable, caller-built queue options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::queue::{QueueConfig, MAX_THREADS};
use crate::core::{
    AccessDescriptor, CallbackSet, CancellationContext, ExecutionResult, Observer, QueueError,
    QueueEvent, TaskError,
};

/// Options for constructing any queue variant.
///
/// Built once by the caller and consumed by the queue constructor.
///
/// ```rust,ignore
/// let options = QueueOptions::new(|item: &u64, _ctx| {
///         println!("{item}");
///         Ok(ExecutionResult::Success)
///     })
///     .with_threads(4)
///     .with_wait_on_dispose(true);
/// ```
pub struct QueueOptions<T> {
    /// Worker count; 0 selects the processor count.
    pub threads: usize,
    /// Drain queued items on dispose instead of discarding them.
    pub wait_on_dispose: bool,
    /// Fixed pause after every enqueue.
    pub sleep_after_enqueue: Option<Duration>,
    /// Minimum duration of a task-group batch.
    pub threshold: Option<Duration>,
    /// Name of the process-wide token (mutex/semaphore variants).
    pub name: Option<String>,
    /// Access control applied by the owner of a named token.
    pub access: Option<AccessDescriptor>,
    /// Work callbacks.
    pub callbacks: CallbackSet<T>,
    /// Observers registered before the queue starts.
    pub observers: Vec<(QueueEvent, Observer)>,
}

impl<T> QueueOptions<T> {
    /// Options with default settings around an execute callback.
    pub fn new<F>(execute: F) -> Self
    where
        F: Fn(&T, &CancellationContext) -> Result<ExecutionResult, TaskError> + Send + Sync + 'static,
    {
        Self::with_callbacks(CallbackSet::new(execute))
    }

    /// Options with default settings around a prepared callback set.
    #[must_use]
    pub const fn with_callbacks(callbacks: CallbackSet<T>) -> Self {
        Self {
            threads: 0,
            wait_on_dispose: false,
            sleep_after_enqueue: None,
            threshold: None,
            name: None,
            access: None,
            callbacks,
            observers: Vec::new(),
        }
    }

    /// Options from a loaded configuration.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` when `cfg` is invalid.
    pub fn from_config(cfg: &QueueConfig, callbacks: CallbackSet<T>) -> Result<Self, QueueError> {
        cfg.validate()?;
        Ok(Self {
            threads: cfg.threads,
            wait_on_dispose: cfg.wait_on_dispose,
            sleep_after_enqueue: cfg.sleep_after_enqueue_ms.map(Duration::from_millis),
            threshold: cfg.threshold_ms.map(Duration::from_millis),
            name: cfg.name.clone(),
            access: cfg.access_mode.map(AccessDescriptor::new),
            callbacks,
            observers: Vec::new(),
        })
    }

    /// Set the worker count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the dispose policy.
    #[must_use]
    pub fn with_wait_on_dispose(mut self, wait: bool) -> Self {
        self.wait_on_dispose = wait;
        self
    }

    /// Pause for `delay` after every enqueue.
    #[must_use]
    pub fn with_sleep_after_enqueue(mut self, delay: Duration) -> Self {
        self.sleep_after_enqueue = Some(delay);
        self
    }

    /// Make each task-group batch last at least `threshold`.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Back the queue with a process-wide token of this name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Access control applied if this queue creates the named token.
    #[must_use]
    pub fn with_access(mut self, access: AccessDescriptor) -> Self {
        self.access = Some(access);
        self
    }

    /// Set the result callback.
    #[must_use]
    pub fn with_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, ExecutionResult, Option<&TaskError>) -> bool + Send + Sync + 'static,
    {
        self.callbacks.result = Some(Arc::new(f));
        self
    }

    /// Set the scheduled (admission) callback.
    #[must_use]
    pub fn with_scheduled<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.callbacks.scheduled = Some(Arc::new(f));
        self
    }

    /// Set the finalize callback.
    #[must_use]
    pub fn with_finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.callbacks.finalize = Some(Arc::new(f));
        self
    }

    /// Observe the work-started transition.
    #[must_use]
    pub fn with_work_started<F>(mut self, f: F) -> Self
    where
        F: Fn(QueueEvent) + Send + Sync + 'static,
    {
        self.observers.push((QueueEvent::WorkStarted, Arc::new(f)));
        self
    }

    /// Observe the work-completed transition.
    #[must_use]
    pub fn with_work_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(QueueEvent) + Send + Sync + 'static,
    {
        self.observers.push((QueueEvent::WorkCompleted, Arc::new(f)));
        self
    }

    /// Validate option values.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.threads > MAX_THREADS {
            return Err(QueueError::Configuration(format!(
                "threads must be at most {MAX_THREADS}, got {}",
                self.threads
            )));
        }
        if self.threshold.is_some_and(|t| t.is_zero()) {
            return Err(QueueError::Configuration("threshold must be greater than 0".into()));
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(QueueError::Configuration("name must not be blank".into()));
        }
        Ok(())
    }

    /// Thread count the queue will run with: processor count for 0, clamped to `1..=MAX_THREADS`.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        let threads = if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        };
        threads.clamp(1, MAX_THREADS)
    }
}

impl<T> Clone for QueueOptions<T> {
    fn clone(&self) -> Self {
        Self {
            threads: self.threads,
            wait_on_dispose: self.wait_on_dispose,
            sleep_after_enqueue: self.sleep_after_enqueue,
            threshold: self.threshold,
            name: self.name.clone(),
            access: self.access,
            callbacks: self.callbacks.clone(),
            observers: self.observers.clone(),
        }
    }
}

impl<T> fmt::Debug for QueueOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("threads", &self.threads)
            .field("wait_on_dispose", &self.wait_on_dispose)
            .field("sleep_after_enqueue", &self.sleep_after_enqueue)
            .field("threshold", &self.threshold)
            .field("name", &self.name)
            .field("access", &self.access)
            .field("callbacks", &self.callbacks)
            .field("observers", &self.observers.len())
            .finish()
    }
}
