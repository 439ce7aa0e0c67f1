//! # Prometheus Thread Queue
//!
//! Producer/consumer thread queues with bounded concurrency, pause/resume,
//! cooperative cancellation and a race-free, single-fire completion signal.
//!
//! A queue never inspects its items. What work *is* comes from four
//! callbacks ([`CallbackSet`](core::CallbackSet)): execute, result, scheduled
//! and finalize. How items move from "enqueued" to "executing" is the
//! variant:
//!
//! - **Dedicated**: N long-lived threads over a blocking buffer
//! - **Event**: N threads woken on enqueue
//! - **Mutex / Semaphore**: a dispatcher spawning a thread per item behind a
//!   token that can be shared across processes by name
//! - **Local semaphore**: the same behind an in-process semaphore
//! - **Task / Task group**: long-running tasks on a private tokio runtime,
//!   one by one or in fixed batches
//! - **Thread pool**: work items posted to a shared worker pool
//!
//! Every variant is the one generic [`ThreadQueue`](core::ThreadQueue) and
//! shares the same contract:
//!
//! ```rust,ignore
//! use prometheus_thread_queue::config::QueueOptions;
//! use prometheus_thread_queue::core::{CancellationContext, ExecutionResult};
//! use prometheus_thread_queue::queues::DedicatedThreadQueue;
//!
//! let options = QueueOptions::new(|item: &u64, _ctx: &CancellationContext| {
//!         println!("processing {item}");
//!         Ok(ExecutionResult::Success)
//!     })
//!     .with_threads(4)
//!     .with_result(|item: &u64, result, err| {
//!         if let Some(err) = err {
//!             eprintln!("{item}: {result} ({err})");
//!         }
//!         true
//!     });
//!
//! let queue = DedicatedThreadQueue::new(options, CancellationContext::new())?;
//! for i in 0..100 {
//!     queue.enqueue(i)?;
//! }
//! queue.complete()?;
//! assert!(queue.wait());
//! ```
//!
//! Queues can also be picked at runtime with
//! [`create_queue`](queues::create_queue) from a
//! [`QueueConfig`](config::QueueConfig) loaded from JSON or `THREAD_QUEUE_*`
//! environment variables.
//!
//! For complete examples, see:
//! - `tests/queue_test.rs` - behaviour shared by every variant
//! - `tests/named_token_test.rs` - cross-instance admission control

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core queue abstractions: lifecycle, callbacks, completion and admission control.
pub mod core;
/// Queue configuration: serializable settings and caller-built options.
pub mod config;
/// Storage backends for queued items.
pub mod infra;
/// The queue variants and the queue factory.
pub mod queues;
/// Thread bookkeeping, the shared worker pool and runtime spawners.
pub mod runtime;
/// Shared utilities.
pub mod util;
