//! Infrastructure adapters: storage backends for queued items.

pub mod storage;

pub use storage::{BlockingBuffer, MonitorStorage};
