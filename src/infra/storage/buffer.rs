//! Unbounded blocking buffer.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Multi-consumer channel whose sending side can be closed.
///
/// Receivers keep draining buffered items after [`close`](Self::close) and
/// see a disconnect once the buffer is empty.
#[derive(Debug)]
pub struct BlockingBuffer<T> {
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
}

impl<T> BlockingBuffer<T> {
    /// Create an open, empty buffer.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Append an item. Hands it back once the buffer is closed.
    ///
    /// # Errors
    ///
    /// Returns the item if the buffer was closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(item).map_err(|e| e.into_inner()),
            None => Err(item),
        }
    }

    /// A receiving handle for a consumer thread.
    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// Remove every buffered item.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Refuse further items and disconnect idle receivers. Idempotent.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl<T> Default for BlockingBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_close_rejects_and_drains() {
        let buffer = BlockingBuffer::new();
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();
        buffer.close();

        assert!(buffer.is_closed());
        assert_eq!(buffer.push(3), Err(3));
        let rx = buffer.receiver();
        assert_eq!(rx.recv(), Ok(1));
        assert_eq!(buffer.drain(), vec![2]);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_close_wakes_blocked_receiver() {
        let buffer = BlockingBuffer::<u32>::new();
        let rx = buffer.receiver();
        let handle = thread::spawn(move || rx.recv().is_err());
        thread::sleep(std::time::Duration::from_millis(20));
        buffer.close();
        assert!(handle.join().unwrap());
    }
}
