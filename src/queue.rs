//! Bounded blocking FIFO queues.
//!
//! Every inter-thread seam in the crate is a `Queue`: the forwarder's
//! four application/router queues, the RDT's source and sink queues, and
//! the test substrates. Capacity is fixed at construction; `put`/`take`
//! block, the `try_` variants and `peek` do not.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize) -> Queue<T> {
        Queue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Append an item, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        while items.len() == self.capacity {
            items = self.not_full.wait(items).unwrap();
        }
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Append an item if there is room, returning false when full.
    pub fn try_put(&self, item: T) -> bool {
        let mut items = self.items.lock().unwrap();
        if items.len() == self.capacity {
            return false;
        }
        items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Remove the oldest item, blocking while the queue is empty.
    pub fn take(&self) -> T {
        let mut items = self.items.lock().unwrap();
        while items.is_empty() {
            items = self.not_empty.wait(items).unwrap();
        }
        let item = items.pop_front().unwrap();
        self.not_full.notify_one();
        item
    }

    /// Remove the oldest item if there is one.
    pub fn try_take(&self) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        let item = items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Copy of the oldest item without removing it.
    pub fn peek(&self) -> Option<T> {
        let items = self.items.lock().unwrap();
        items.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    /// Number of additional items the queue can accept.
    pub fn remaining(&self) -> usize {
        self.capacity - self.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::Queue;

    #[test]
    fn test_fifo_order() {
        let q = Queue::new(4);
        q.put(1);
        q.put(2);
        q.put(3);
        assert_eq!(q.peek(), Some(1));
        assert_eq!(q.take(), 1);
        assert_eq!(q.take(), 2);
        assert_eq!(q.take(), 3);
        assert!(q.is_empty());
    }

    #[test]
    fn test_try_put_on_full() {
        let q = Queue::new(2);
        assert!(q.try_put("a"));
        assert!(q.try_put("b"));
        assert!(!q.try_put("c"));
        assert_eq!(q.remaining(), 0);
        assert_eq!(q.take(), "a");
        assert_eq!(q.remaining(), 1);
    }

    #[test]
    fn test_peek_is_nondestructive() {
        let q = Queue::new(2);
        q.put(7);
        assert_eq!(q.peek(), Some(7));
        assert_eq!(q.len(), 1);
        assert_eq!(q.try_take(), Some(7));
        assert_eq!(q.try_take(), None);
        assert_eq!(q.peek(), None);
    }

    #[test]
    fn test_blocking_take() {
        let q = Arc::new(Queue::new(1));
        let producer = Arc::clone(&q);
        let handle = thread::spawn(move || {
            producer.put(42);
        });
        assert_eq!(q.take(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn test_blocking_put_waits_for_room() {
        let q = Arc::new(Queue::new(1));
        q.put(1);
        let producer = Arc::clone(&q);
        let handle = thread::spawn(move || {
            // blocks until the consumer below makes room
            producer.put(2);
        });
        assert_eq!(q.take(), 1);
        assert_eq!(q.take(), 2);
        handle.join().unwrap();
    }
}
