//! Bounded FIFO of recently removed items.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::items::{ItemId, SendableItem};

/// Keeps the last `capacity` removed items; the oldest is evicted on overflow.
pub(crate) struct RemovedBuffer {
    items: VecDeque<Arc<SendableItem>>,
    capacity: usize,
}

impl RemovedBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Appends `item`, evicting from the front while over capacity.
    pub(crate) fn push(&mut self, item: Arc<SendableItem>) {
        self.items.push_back(item);
        while self.items.len() > self.capacity {
            if let Some(evicted) = self.items.pop_front() {
                tracing::debug!(item = %evicted.id(), "evicting oldest removed item");
            }
        }
    }

    /// Removes `id` from the buffer if present.
    pub(crate) fn take(&mut self, id: ItemId) -> Option<Arc<SendableItem>> {
        let pos = self.items.iter().position(|i| i.id() == id)?;
        self.items.remove(pos)
    }

    /// Changes the capacity, evicting oldest entries if needed.
    pub(crate) fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<SendableItem>> {
        self.items.iter().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
