//! Messages waiting to be exposed, per destination
//!
//! Insert and arrival events add here; the destination's engine swaps the
//! tracker out for an empty one and exposes the snapshot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::sync::handle_mutex_poison;
use crate::grid::api::PartitionId;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::{Identifier, MessageIdentifier};
use crate::messaging::range::Range;
use crate::messaging::tracker::MessageTracker;

#[derive(Debug, Default)]
pub struct MessagesToExpose {
    trackers: Mutex<HashMap<Identifier, MessageTracker>>,
}

impl MessagesToExpose {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MessagingResult<MutexGuard<'_, HashMap<Identifier, MessageTracker>>> {
        handle_mutex_poison(self.trackers.lock(), |message| MessagingError::Runtime {
            message,
        })
    }

    pub fn add(&self, destination: &Identifier, message_id: MessageIdentifier) -> MessagingResult<()> {
        self.lock()?
            .entry(destination.clone())
            .or_default()
            .add(message_id);
        Ok(())
    }

    pub fn add_tracker(&self, destination: &Identifier, tracker: &MessageTracker) -> MessagingResult<()> {
        if tracker.is_empty() {
            return Ok(());
        }
        self.lock()?
            .entry(destination.clone())
            .or_default()
            .add_all(tracker);
        Ok(())
    }

    /// Take everything pending for `destination`, leaving an empty tracker behind
    pub fn get_tracker_snapshot(&self, destination: &Identifier) -> MessagingResult<MessageTracker> {
        let mut trackers = self.lock()?;
        Ok(trackers
            .get_mut(destination)
            .map(std::mem::take)
            .unwrap_or_default())
    }

    /// Install the authoritative post-transfer range for one partition
    pub fn create_range_for_partition(
        &self,
        destination: &Identifier,
        partition: PartitionId,
        range: Range,
    ) -> MessagingResult<()> {
        log::debug!(
            "Partition {} of {} has {} messages to expose after transfer",
            partition,
            destination,
            range.len()
        );
        self.lock()?
            .entry(destination.clone())
            .or_default()
            .replace_partition(partition, range);
        Ok(())
    }

    pub fn clear_partition(&self, destination: &Identifier, partition: PartitionId) -> MessagingResult<()> {
        if let Some(tracker) = self.lock()?.get_mut(destination) {
            tracker.clear_partition(partition);
        }
        Ok(())
    }

    pub fn remove_destination(&self, destination: &Identifier) -> MessagingResult<()> {
        self.lock()?.remove(destination);
        Ok(())
    }

    pub fn pending_count(&self, destination: &Identifier) -> usize {
        self.lock()
            .ok()
            .and_then(|trackers| trackers.get(destination).map(|t| t.size()))
            .unwrap_or(0)
    }

    pub fn tracker(&self, destination: &Identifier) -> MessagingResult<MessageTracker> {
        Ok(self.lock()?.get(destination).cloned().unwrap_or_default())
    }
}
