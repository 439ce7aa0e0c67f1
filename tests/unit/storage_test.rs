//! Tests for item storage backends

use prometheus_thread_queue::infra::{BlockingBuffer, MonitorStorage};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_monitor_storage_is_fifo() {
    let storage = MonitorStorage::new();
    for i in 0..5 {
        storage.push(i);
    }
    assert_eq!(storage.len(), 5);
    assert_eq!(storage.pop_batch(2), vec![0, 1]);
    assert_eq!(storage.try_pop(), Some(2));
    assert_eq!(storage.drain(), vec![3, 4]);
    assert!(storage.is_empty());
}

#[test]
fn test_monitor_storage_waiter_released_by_push() {
    let storage = Arc::new(MonitorStorage::new());
    let consumer = {
        let storage = Arc::clone(&storage);
        thread::spawn(move || storage.pop_wait(|| false, || false, || false))
    };
    thread::sleep(Duration::from_millis(20));
    storage.push(42);
    assert_eq!(consumer.join().unwrap(), Some(42));
}

#[test]
fn test_blocking_buffer_close_ends_consumers() {
    let buffer = BlockingBuffer::new();
    assert!(buffer.push(1).is_ok());
    buffer.close();
    assert!(buffer.is_closed());
    assert_eq!(buffer.push(2), Err(2));
    let rx = buffer.receiver();
    assert_eq!(rx.recv().ok(), Some(1));
    assert!(rx.recv().is_err());
}
