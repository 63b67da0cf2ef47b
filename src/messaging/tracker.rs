//! Sparse set of message identifiers
//!
//! One [`Range`] per partition plus a per-partition watermark holding the
//! highest sequence number ever added. The watermark survives removal, so an
//! identifier that was delivered and dropped is still recognised as a
//! duplicate when a partition transfer replays it.

use std::collections::BTreeMap;

use crate::grid::api::PartitionId;
use crate::messaging::identifier::MessageIdentifier;
use crate::messaging::range::Range;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageTracker {
    ranges: BTreeMap<PartitionId, Range>,
    watermarks: BTreeMap<PartitionId, i64>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn raise_watermark(&mut self, partition: PartitionId, sequence: i64) {
        let watermark = self.watermarks.entry(partition).or_insert(sequence);
        if sequence > *watermark {
            *watermark = sequence;
        }
    }

    /// Add an identifier; the null sentinel is ignored
    pub fn add(&mut self, id: MessageIdentifier) -> bool {
        if id.is_null() {
            return false;
        }
        let added = self
            .ranges
            .entry(id.partition_id())
            .or_default()
            .add(id.sequence_number());
        self.raise_watermark(id.partition_id(), id.sequence_number());
        added
    }

    /// Remove an identifier if present; the watermark is left alone
    pub fn remove(&mut self, id: MessageIdentifier) -> bool {
        let Some(range) = self.ranges.get_mut(&id.partition_id()) else {
            return false;
        };
        let removed = range.remove(id.sequence_number());
        if range.is_empty() {
            self.ranges.remove(&id.partition_id());
        }
        removed
    }

    pub fn contains(&self, id: MessageIdentifier) -> bool {
        self.ranges
            .get(&id.partition_id())
            .is_some_and(|range| range.contains(id.sequence_number()))
    }

    /// True when `id` is at or below the highest sequence ever added for its partition
    pub fn is_duplicate_message(&self, id: MessageIdentifier) -> bool {
        self.watermarks
            .get(&id.partition_id())
            .is_some_and(|&watermark| id.sequence_number() <= watermark)
    }

    pub fn size(&self) -> usize {
        self.ranges.values().map(|range| range.len() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Identifiers ordered by partition, then sequence number
    pub fn iter(&self) -> impl Iterator<Item = MessageIdentifier> + '_ {
        self.ranges.iter().flat_map(|(&partition, range)| {
            range
                .iter()
                .map(move |sequence| MessageIdentifier::new(partition, sequence))
        })
    }

    pub fn first(&self) -> Option<MessageIdentifier> {
        self.ranges
            .iter()
            .find_map(|(&partition, range)| range.first().map(|seq| MessageIdentifier::new(partition, seq)))
    }

    pub fn pop_first(&mut self) -> Option<MessageIdentifier> {
        let first = self.first()?;
        self.remove(first);
        Some(first)
    }

    /// Keep only the identifiers for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(MessageIdentifier) -> bool) {
        let dropped: Vec<MessageIdentifier> = self.iter().filter(|&id| !keep(id)).collect();
        for id in dropped {
            self.remove(id);
        }
    }

    /// Iterate the identifiers matching `take`, removing each one as it is yielded
    ///
    /// Matches not yet reached when the iterator is dropped stay in the tracker.
    pub fn drain_where(&mut self, mut take: impl FnMut(MessageIdentifier) -> bool) -> DrainWhere<'_> {
        let matched: Vec<MessageIdentifier> = self.iter().filter(|&id| take(id)).collect();
        DrainWhere {
            tracker: self,
            matched: matched.into_iter(),
        }
    }

    /// Union with `other`, including its watermarks
    pub fn add_all(&mut self, other: &MessageTracker) {
        for (&partition, range) in &other.ranges {
            self.ranges.entry(partition).or_default().union(range);
        }
        for (&partition, &watermark) in &other.watermarks {
            self.raise_watermark(partition, watermark);
        }
    }

    /// Remove every identifier held by `other`
    pub fn remove_all(&mut self, other: &MessageTracker) {
        for (partition, range) in &other.ranges {
            if let Some(own) = self.ranges.get_mut(partition) {
                own.difference(range);
                if own.is_empty() {
                    self.ranges.remove(partition);
                }
            }
        }
    }

    /// Partitions currently holding at least one identifier
    pub fn partitions(&self) -> Vec<PartitionId> {
        self.ranges.keys().copied().collect()
    }

    pub fn range_for_partition(&self, partition: PartitionId) -> Option<&Range> {
        self.ranges.get(&partition)
    }

    /// Replace whatever was held for `partition` with `range`
    pub fn replace_partition(&mut self, partition: PartitionId, range: Range) {
        if let Some(last) = range.last() {
            self.raise_watermark(partition, last);
        }
        if range.is_empty() {
            self.ranges.remove(&partition);
        } else {
            self.ranges.insert(partition, range);
        }
    }

    /// Drop every identifier of `partition`, keeping its watermark
    pub fn clear_partition(&mut self, partition: PartitionId) -> Option<Range> {
        self.ranges.remove(&partition)
    }

    /// Highest sequence number ever added for `partition`
    pub fn last_sequence_for_partition(&self, partition: PartitionId) -> Option<i64> {
        self.watermarks.get(&partition).copied()
    }
}

/// Removing iterator returned by [`MessageTracker::drain_where`]
pub struct DrainWhere<'a> {
    tracker: &'a mut MessageTracker,
    matched: std::vec::IntoIter<MessageIdentifier>,
}

impl Iterator for DrainWhere<'_> {
    type Item = MessageIdentifier;

    fn next(&mut self) -> Option<MessageIdentifier> {
        let id = self.matched.next()?;
        self.tracker.remove(id);
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.matched.size_hint()
    }
}

impl FromIterator<MessageIdentifier> for MessageTracker {
    fn from_iter<I: IntoIterator<Item = MessageIdentifier>>(iter: I) -> Self {
        let mut tracker = MessageTracker::new();
        tracker.extend(iter);
        tracker
    }
}

impl Extend<MessageIdentifier> for MessageTracker {
    fn extend<I: IntoIterator<Item = MessageIdentifier>>(&mut self, iter: I) {
        for id in iter {
            self.add(id);
        }
    }
}
