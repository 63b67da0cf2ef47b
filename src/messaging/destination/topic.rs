//! Fan-out destination
//!
//! A topic keeps no delivery state of its own: each subscription tracks what
//! is visible to it. The topic only records its subscriptions and counters.

use std::collections::{BTreeMap, BTreeSet};

use crate::grid::api::PartitionId;
use crate::messaging::identifier::{Identifier, SubscriptionIdentifier};
use crate::messaging::tracker::MessageTracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topic {
    identifier: Identifier,
    subscriptions: BTreeSet<SubscriptionIdentifier>,
    last_message_sequence_numbers: BTreeMap<PartitionId, i64>,
    num_messages_received: u64,
    num_messages_exposed: u64,
}

impl Topic {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            subscriptions: BTreeSet::new(),
            last_message_sequence_numbers: BTreeMap::new(),
            num_messages_received: 0,
            num_messages_exposed: 0,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn subscriptions(&self) -> &BTreeSet<SubscriptionIdentifier> {
        &self.subscriptions
    }

    pub fn add_subscription(&mut self, subscription: SubscriptionIdentifier) -> bool {
        self.subscriptions.insert(subscription)
    }

    pub fn remove_subscription(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        self.subscriptions.remove(subscription)
    }

    pub fn num_messages_received(&self) -> u64 {
        self.num_messages_received
    }

    /// Message-to-subscription exposures performed so far
    pub fn num_messages_exposed(&self) -> u64 {
        self.num_messages_exposed
    }

    pub fn last_sequence_for_partition(&self, partition: PartitionId) -> Option<i64> {
        self.last_message_sequence_numbers.get(&partition).copied()
    }

    /// Count a batch about to be exposed; returns the number of new messages
    pub fn on_accept_message(&mut self, tracker: &MessageTracker) -> usize {
        let mut accepted = 0;
        for id in tracker.iter() {
            let last = self
                .last_message_sequence_numbers
                .entry(id.partition_id())
                .or_insert(i64::MIN);
            if id.sequence_number() <= *last {
                log::warn!(
                    "Topic {} received message {} out of sequence (last seen {})",
                    self.identifier,
                    id,
                    last
                );
                continue;
            }
            *last = id.sequence_number();
            accepted += 1;
        }
        self.num_messages_received += accepted as u64;
        accepted
    }

    /// Count one exposure per message handed to each subscription
    pub fn record_exposure(&mut self, exposures: usize) {
        self.num_messages_exposed += exposures as u64;
    }
}
