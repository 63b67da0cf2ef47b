//! Partitioning strategy and partition transfer notifications

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::grid::error::{GridError, GridResult};
use crate::grid::event::{PartitionEvent, PartitionEventKind, PartitionListener};

/// Partition number within a cache; `-1` is reserved for "no partition"
pub type PartitionId = i32;

/// Keys decide which partition they live in
///
/// Most keys hash. Keys that must be co-located with other state (message keys
/// next to their publisher) return a partition derived from their contents.
pub trait PartitionAware {
    fn partition(&self, partition_count: u32) -> PartitionId;
}

/// Stable hash-based partition for keys without an explicit affinity
pub fn hash_partition<T: Hash + ?Sized>(value: &T, partition_count: u32) -> PartitionId {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    let count = u64::from(partition_count.clamp(1, i32::MAX as u32));
    (hasher.finish() % count) as PartitionId
}

/// Fans partition transfer begin/commit/rollback notifications out to listeners
#[derive(Default)]
pub struct PartitionService {
    listeners: RwLock<Vec<Arc<dyn PartitionListener>>>,
}

impl PartitionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn PartitionListener>) -> GridResult<()> {
        let mut listeners = handle_rwlock_write(self.listeners.write(), |message| {
            GridError::Poisoned { message }
        })?;
        listeners.push(listener);
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver one transfer notification to every listener in registration order
    pub fn fire(&self, kind: PartitionEventKind, partition: PartitionId) -> GridResult<()> {
        let listeners: Vec<Arc<dyn PartitionListener>> = {
            let guard = handle_rwlock_read(self.listeners.read(), |message| {
                GridError::Poisoned { message }
            })?;
            guard.clone()
        };

        log::debug!("Partition {} transfer event: {}", partition, kind);
        let event = PartitionEvent { kind, partition };
        for listener in listeners {
            listener.on_partition_event(&event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_hash_partition_is_stable_and_in_range() {
        for count in [1_u32, 7, 31, 257] {
            let first = hash_partition("orders", count);
            assert_eq!(first, hash_partition("orders", count));
            assert!(first >= 0 && first < count as i32);
        }
    }

    #[test]
    fn test_hash_partition_zero_count_treated_as_one() {
        assert_eq!(hash_partition("orders", 0), 0);
    }

    struct Recorder(Mutex<Vec<PartitionEvent>>);

    impl PartitionListener for Recorder {
        fn on_partition_event(&self, event: &PartitionEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_partition_service_fires_in_order() {
        let service = PartitionService::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        service.add_listener(recorder.clone()).unwrap();

        service.fire(PartitionEventKind::ArrivalBegin, 3).unwrap();
        service.fire(PartitionEventKind::ArrivalCommit, 3).unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, PartitionEventKind::ArrivalBegin);
        assert_eq!(events[1].kind, PartitionEventKind::ArrivalCommit);
        assert_eq!(events[1].partition, 3);
        assert_eq!(service.listener_count(), 1);
    }
}
