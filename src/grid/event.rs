//! Entry and partition event types

use strum_macros::Display;

use crate::grid::partition::PartitionId;

/// What happened to a cache entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum EntryEventKind {
    Inserted,
    Updated,
    Removed,
    /// Entry became local because its partition was transferred to this member
    Arrived,
    /// Entry left because its partition was transferred away
    Departed,
}

/// A committed change to one cache entry
///
/// Delivered after the partition lock is released, so listeners may freely
/// invoke against any cache.
#[derive(Clone, Debug)]
pub struct CacheEvent<K, V> {
    pub kind: EntryEventKind,
    pub partition: PartitionId,
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

impl<K, V> CacheEvent<K, V> {
    /// The value that best describes the entry after the event
    pub fn value(&self) -> Option<&V> {
        self.new_value.as_ref().or(self.old_value.as_ref())
    }
}

/// Receives committed entry changes for one cache
pub trait CacheListener<K, V>: Send + Sync {
    fn on_event(&self, event: &CacheEvent<K, V>);
}

/// Partition transfer stages, in the order they are fired
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum PartitionEventKind {
    ArrivalBegin,
    ArrivalCommit,
    ArrivalRollback,
    DepartureBegin,
    DepartureCommit,
    DepartureRollback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionEvent {
    pub kind: PartitionEventKind,
    pub partition: PartitionId,
}

/// Receives partition transfer notifications
pub trait PartitionListener: Send + Sync {
    fn on_partition_event(&self, event: &PartitionEvent);
}
