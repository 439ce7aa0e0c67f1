//! Item storage backing the queue variants.
//!
//! - [`MonitorStorage`]: FIFO deque guarded by a mutex and condition variable
//! - [`BlockingBuffer`]: unbounded crossbeam channel drained by blocking receivers

pub mod buffer;
pub mod monitor;

pub use buffer::BlockingBuffer;
pub use monitor::MonitorStorage;
