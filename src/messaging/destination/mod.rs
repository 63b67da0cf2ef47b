//! Destinations stored in the Destinations cache
//!
//! A destination owns its set of subscriptions. Queues additionally own the
//! delivery state that hands each message to exactly one subscription.

pub(crate) mod queue;
pub(crate) mod topic;

use serde::Serialize;
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};

use crate::grid::api::PartitionId;
use crate::messaging::identifier::{Identifier, SubscriptionIdentifier};

pub use queue::{DeliveryOutcome, Queue, QueueDelivery, QueueDeliveryResults};
pub use topic::Topic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum DestinationKind {
    Queue,
    Topic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Queue(Queue),
    Topic(Topic),
}

/// Point-in-time counters for one destination
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DestinationStats {
    pub identifier: Identifier,
    pub kind: DestinationKind,
    pub subscriptions: usize,
    pub messages_received: u64,
    pub messages_delivered: u64,
    /// Queue: accepted but not yet delivered. Topic: always zero.
    pub pending: usize,
}

impl Destination {
    pub fn new(kind: DestinationKind, identifier: Identifier) -> Self {
        match kind {
            DestinationKind::Queue => Destination::Queue(Queue::new(identifier)),
            DestinationKind::Topic => Destination::Topic(Topic::new(identifier)),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Queue(_) => DestinationKind::Queue,
            Destination::Topic(_) => DestinationKind::Topic,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        match self {
            Destination::Queue(queue) => queue.identifier(),
            Destination::Topic(topic) => topic.identifier(),
        }
    }

    pub fn subscriptions(&self) -> &BTreeSet<SubscriptionIdentifier> {
        match self {
            Destination::Queue(queue) => queue.subscriptions(),
            Destination::Topic(topic) => topic.subscriptions(),
        }
    }

    pub fn add_subscription(&mut self, subscription: SubscriptionIdentifier) -> bool {
        match self {
            Destination::Queue(queue) => queue.add_subscription(subscription),
            Destination::Topic(topic) => topic.add_subscription(subscription),
        }
    }

    pub fn remove_subscription(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        match self {
            Destination::Queue(queue) => queue.remove_subscription(subscription),
            Destination::Topic(topic) => topic.remove_subscription(subscription),
        }
    }

    /// Highest sequence number this destination has accepted from `partition`
    pub fn last_sequence_for_partition(&self, partition: PartitionId) -> Option<i64> {
        match self {
            Destination::Queue(queue) => queue.last_sequence_for_partition(partition),
            Destination::Topic(topic) => topic.last_sequence_for_partition(partition),
        }
    }

    pub fn stats(&self) -> DestinationStats {
        let (messages_received, messages_delivered, pending) = match self {
            Destination::Queue(queue) => (
                queue.num_messages_received(),
                queue.num_messages_delivered(),
                queue.pending_count(),
            ),
            Destination::Topic(topic) => (
                topic.num_messages_received(),
                topic.num_messages_exposed(),
                0,
            ),
        };
        DestinationStats {
            identifier: self.identifier().clone(),
            kind: self.kind(),
            subscriptions: self.subscriptions().len(),
            messages_received,
            messages_delivered,
            pending,
        }
    }

    pub fn as_queue(&self) -> Option<&Queue> {
        match self {
            Destination::Queue(queue) => Some(queue),
            Destination::Topic(_) => None,
        }
    }

    pub fn as_topic(&self) -> Option<&Topic> {
        match self {
            Destination::Topic(topic) => Some(topic),
            Destination::Queue(_) => None,
        }
    }
}
