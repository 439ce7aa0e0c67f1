//! Queue configuration: serializable settings, variant selection and caller-built options.

pub mod options;
pub mod queue;

pub use options::QueueOptions;
pub use queue::{QueueConfig, ThreadQueueMode, MAX_THREADS};
