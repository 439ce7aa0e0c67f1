//! Core queue abstractions: lifecycle, callbacks, completion and admission control.

pub mod callbacks;
pub mod cancel;
pub mod completion;
pub mod error;
pub mod observer;
pub mod queue;
pub mod stats;
pub mod token;

pub use callbacks::{CallbackSet, ExecuteFn, ExecutionResult, FinalizeFn, ResultFn, ScheduledFn};
pub use cancel::CancellationContext;
pub use completion::{CompletionState, CompletionTracker};
pub use error::{AppResult, QueueError, TaskError};
pub use observer::{Observer, Observers, QueueEvent};
pub use queue::{ProducerConsumer, QueueCore, Shared, Strategy, ThreadQueue};
pub use stats::QueueStats;
pub use token::{AccessDescriptor, AdmissionToken, LocalSemaphore, NamedToken, Permit};

pub(crate) use queue::{spawn_worker, ABANDON_TIMEOUT};
