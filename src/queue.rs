use std::collections::VecDeque;

use crate::source::SourceRef;

/// Returned by [`TrackQueue::try_enqueue`] when there is no room left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

/// Bounded FIFO of tracks waiting behind the current one.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<SourceRef>,
    capacity: usize,
}

impl TrackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `source` unless the queue is already at capacity.
    pub fn try_enqueue(&mut self, source: SourceRef) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull);
        }
        self.items.push_back(source);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<SourceRef> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Copy of the pending tracks, front first.
    pub fn snapshot(&self) -> Vec<SourceRef> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
