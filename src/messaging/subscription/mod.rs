//! Subscriptions stored in the Subscriptions cache
//!
//! Both variants share [`LeasedSubscription`]: identity, status, the tracker
//! of messages visible to the subscriber, and the lease that keeps the
//! subscription alive.

pub(crate) mod queue;
pub(crate) mod topic;

use std::collections::BTreeMap;
use strum_macros::Display;

use crate::core::time::EpochMillis;
use crate::grid::api::{Lease, PartitionId};
use crate::messaging::destination::DestinationKind;
use crate::messaging::identifier::{MessageIdentifier, SubscriptionIdentifier};
use crate::messaging::tracker::MessageTracker;

pub use queue::QueueSubscription;
pub use topic::TopicSubscription;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SubscriptionStatus {
    Enabled,
    Disabled,
}

/// State common to queue and topic subscriptions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeasedSubscription {
    identifier: SubscriptionIdentifier,
    status: SubscriptionStatus,
    visible: MessageTracker,
    last_message_sequence_numbers: BTreeMap<PartitionId, i64>,
    num_messages_received: u64,
    num_messages_acknowledged: u64,
    lease: Lease,
    durable: bool,
}

impl LeasedSubscription {
    pub fn new(identifier: SubscriptionIdentifier, lease: Lease, durable: bool) -> Self {
        Self {
            identifier,
            status: SubscriptionStatus::Enabled,
            visible: MessageTracker::new(),
            last_message_sequence_numbers: BTreeMap::new(),
            num_messages_received: 0,
            num_messages_acknowledged: 0,
            lease,
            durable,
        }
    }

    pub fn identifier(&self) -> &SubscriptionIdentifier {
        &self.identifier
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn enable(&mut self) {
        self.status = SubscriptionStatus::Enabled;
    }

    pub fn disable(&mut self) {
        self.status = SubscriptionStatus::Disabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.status == SubscriptionStatus::Enabled
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn visible_messages(&self) -> &MessageTracker {
        &self.visible
    }

    pub(crate) fn visible_messages_mut(&mut self) -> &mut MessageTracker {
        &mut self.visible
    }

    pub fn num_messages_received(&self) -> u64 {
        self.num_messages_received
    }

    pub fn num_messages_acknowledged(&self) -> u64 {
        self.num_messages_acknowledged
    }

    pub fn last_sequence_for_partition(&self, partition: PartitionId) -> Option<i64> {
        self.last_message_sequence_numbers.get(&partition).copied()
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    pub fn extend_lease(&mut self, now: EpochMillis) {
        self.lease.extend(now);
    }

    pub fn suspend_lease(&mut self) {
        self.lease.suspend();
    }

    pub fn resume_lease(&mut self, now: EpochMillis) {
        self.lease.resume(now);
    }

    /// Make one message visible regardless of sequence
    pub(crate) fn accept_one(&mut self, id: MessageIdentifier) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let last = self
            .last_message_sequence_numbers
            .entry(id.partition_id())
            .or_insert(id.sequence_number());
        if id.sequence_number() > *last {
            *last = id.sequence_number();
        }
        if self.visible.add(id) {
            self.num_messages_received += 1;
        }
        true
    }

    /// Make a batch visible, skipping identifiers at or below the last sequence seen
    ///
    /// Returns the identifiers actually taken, or `None` when the subscription
    /// is disabled.
    pub(crate) fn accept_batch(&mut self, tracker: &MessageTracker) -> Option<MessageTracker> {
        if !self.is_enabled() {
            return None;
        }
        let mut accepted = MessageTracker::new();
        for id in tracker.iter() {
            let partition = id.partition_id();
            if let Some(&last) = self.last_message_sequence_numbers.get(&partition) {
                if id.sequence_number() <= last {
                    log::warn!(
                        "Subscription {} received message {} out of sequence (last seen {})",
                        self.identifier,
                        id,
                        last
                    );
                    continue;
                }
            }
            self.last_message_sequence_numbers
                .insert(partition, id.sequence_number());
            self.visible.add(id);
            self.num_messages_received += 1;
            accepted.add(id);
        }
        Some(accepted)
    }

    pub(crate) fn record_acknowledged(&mut self, count: usize) {
        self.num_messages_acknowledged += count as u64;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subscription {
    Queue(QueueSubscription),
    Topic(TopicSubscription),
}

impl Subscription {
    pub fn new(
        kind: DestinationKind,
        identifier: SubscriptionIdentifier,
        lease: Lease,
        durable: bool,
    ) -> Self {
        let leased = LeasedSubscription::new(identifier, lease, durable);
        match kind {
            DestinationKind::Queue => Subscription::Queue(QueueSubscription::new(leased)),
            DestinationKind::Topic => Subscription::Topic(TopicSubscription::new(leased)),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Subscription::Queue(_) => DestinationKind::Queue,
            Subscription::Topic(_) => DestinationKind::Topic,
        }
    }

    pub fn leased(&self) -> &LeasedSubscription {
        match self {
            Subscription::Queue(queue) => queue.leased(),
            Subscription::Topic(topic) => topic.leased(),
        }
    }

    pub fn leased_mut(&mut self) -> &mut LeasedSubscription {
        match self {
            Subscription::Queue(queue) => queue.leased_mut(),
            Subscription::Topic(topic) => topic.leased_mut(),
        }
    }

    pub fn identifier(&self) -> &SubscriptionIdentifier {
        self.leased().identifier()
    }

    pub fn is_durable(&self) -> bool {
        self.leased().is_durable()
    }

    /// Every message the subscriber still holds: visible plus delivered-uncommitted
    pub fn outstanding_messages(&self) -> MessageTracker {
        match self {
            Subscription::Queue(queue) => queue.leased().visible_messages().clone(),
            Subscription::Topic(topic) => {
                let mut outstanding = topic.leased().visible_messages().clone();
                outstanding.add_all(topic.delivered_messages());
                outstanding
            }
        }
    }

    pub fn as_queue(&self) -> Option<&QueueSubscription> {
        match self {
            Subscription::Queue(queue) => Some(queue),
            Subscription::Topic(_) => None,
        }
    }

    pub fn as_topic(&self) -> Option<&TopicSubscription> {
        match self {
            Subscription::Topic(topic) => Some(topic),
            Subscription::Queue(_) => None,
        }
    }
}
