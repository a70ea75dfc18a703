//! The outbox: an unbounded FIFO of pending messages.
//!
//! All access goes through one mutex and no I/O happens while it is held.
//! A message that failed transiently goes back to the head with
//! [`Outbox::push_front`], so it is retried before anything queued after it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::QueuedMessage;

/// Thread-safe queue of messages awaiting delivery.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Mutex<VecDeque<Arc<QueuedMessage>>>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<QueuedMessage>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message at the tail.
    pub fn push(&self, message: Arc<QueuedMessage>) {
        self.lock().push_back(message);
    }

    /// Re-inserts a message at the head.
    pub fn push_front(&self, message: Arc<QueuedMessage>) {
        self.lock().push_front(message);
    }

    /// Removes and returns the head.
    pub fn pop_front(&self) -> Option<Arc<QueuedMessage>> {
        self.lock().pop_front()
    }

    /// Returns the number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every queued message, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_message;

    fn queued(subject: &str) -> Arc<QueuedMessage> {
        Arc::new(QueuedMessage::new(test_message(subject)))
    }

    fn subject(message: Option<Arc<QueuedMessage>>) -> Option<String> {
        message.and_then(|m| m.subject().map(str::to_owned))
    }

    #[test]
    fn test_fifo_order() {
        let outbox = Outbox::new();
        outbox.push(queued("1"));
        outbox.push(queued("2"));
        outbox.push(queued("3"));
        assert_eq!(outbox.len(), 3);

        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("1"));
        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("2"));
        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("3"));
        assert!(outbox.pop_front().is_none());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_push_front_takes_priority() {
        let outbox = Outbox::new();
        outbox.push(queued("1"));
        outbox.push(queued("2"));

        let head = outbox.pop_front().unwrap();
        outbox.push(queued("3"));
        outbox.push_front(head);

        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("1"));
        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("2"));
        assert_eq!(subject(outbox.pop_front()).as_deref(), Some("3"));
    }

    #[test]
    fn test_clear_reports_dropped() {
        let outbox = Outbox::new();
        outbox.push(queued("a"));
        outbox.push(queued("b"));
        assert_eq!(outbox.clear(), 2);
        assert_eq!(outbox.len(), 0);
    }

    #[test]
    fn test_concurrent_pushes() {
        let outbox = Arc::new(Outbox::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let outbox = Arc::clone(&outbox);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        outbox.push(queued(&format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(outbox.len(), 200);
    }
}
