//! Per-receiver statistics for the notification system

use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics tracking for one update receiver
#[derive(Debug)]
pub struct SubscriberStatistics {
    queue_size: AtomicUsize,
    messages_processed: AtomicUsize,
}

impl Default for SubscriberStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberStatistics {
    pub fn new() -> Self {
        Self {
            queue_size: AtomicUsize::new(0),
            messages_processed: AtomicUsize::new(0),
        }
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Relaxed)
    }

    pub fn increment_queue_size(&self) {
        self.queue_size.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_queue_size(&self) {
        self.queue_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            })
            .ok();
    }

    pub fn messages_processed(&self) -> usize {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }
}
