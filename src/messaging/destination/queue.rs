//! Point-to-point destination
//!
//! Every message goes to exactly one waiting subscription, in round-robin
//! order. Messages rolled back by a subscriber are redelivered before fresh
//! ones. Delivery is split in two: [`Queue::do_delivery`] plans assignments
//! from a snapshot, and [`Queue::process_delivery_results`] applies the
//! outcome in a separate atomic update.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::grid::api::PartitionId;
use crate::messaging::identifier::{Identifier, MessageIdentifier, SubscriptionIdentifier};
use crate::messaging::tracker::MessageTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Planned, not attempted yet
    Pending,
    Delivered,
    /// The subscription could not take the message; it is redelivered later
    Failed,
    /// The message no longer exists
    Discarded,
}

/// One planned hand-off of a message to a subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueDelivery {
    pub subscription: SubscriptionIdentifier,
    pub message_id: MessageIdentifier,
    pub outcome: DeliveryOutcome,
}

/// Output of one delivery pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueDeliveryResults {
    deliveries: Vec<QueueDelivery>,
}

impl QueueDeliveryResults {
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn deliveries(&self) -> &[QueueDelivery] {
        &self.deliveries
    }

    pub fn deliveries_mut(&mut self) -> &mut [QueueDelivery] {
        &mut self.deliveries
    }

    /// Messages planned for `subscription`, in assignment order
    pub fn messages_for(&self, subscription: &SubscriptionIdentifier) -> Vec<MessageIdentifier> {
        self.deliveries
            .iter()
            .filter(|d| &d.subscription == subscription)
            .map(|d| d.message_id)
            .collect()
    }

    /// Subscriptions that received at least one message, in first-delivery order
    pub fn satisfied_subscriptions(&self) -> Vec<SubscriptionIdentifier> {
        let mut satisfied: Vec<SubscriptionIdentifier> = Vec::new();
        for delivery in &self.deliveries {
            if delivery.outcome == DeliveryOutcome::Delivered
                && !satisfied.contains(&delivery.subscription)
            {
                satisfied.push(delivery.subscription.clone());
            }
        }
        satisfied
    }

    pub fn mark_all(&mut self, outcome: DeliveryOutcome) {
        for delivery in &mut self.deliveries {
            delivery.outcome = outcome;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Queue {
    identifier: Identifier,
    subscriptions: BTreeSet<SubscriptionIdentifier>,
    messages_to_deliver: MessageTracker,
    messages_to_redeliver: VecDeque<MessageIdentifier>,
    waiting_subscriptions: VecDeque<SubscriptionIdentifier>,
    duplicate_requests: VecDeque<SubscriptionIdentifier>,
    last_message_sequence_numbers: BTreeMap<PartitionId, i64>,
    num_messages_received: u64,
    num_messages_delivered: u64,
}

impl Queue {
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            subscriptions: BTreeSet::new(),
            messages_to_deliver: MessageTracker::new(),
            messages_to_redeliver: VecDeque::new(),
            waiting_subscriptions: VecDeque::new(),
            duplicate_requests: VecDeque::new(),
            last_message_sequence_numbers: BTreeMap::new(),
            num_messages_received: 0,
            num_messages_delivered: 0,
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

    /// Forget a subscription, including any outstanding requests it made
    pub fn remove_subscription(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        self.waiting_subscriptions.retain(|s| s != subscription);
        self.duplicate_requests.retain(|s| s != subscription);
        self.subscriptions.remove(subscription)
    }

    /// Withdraw every outstanding request from a subscription that stays attached
    ///
    /// Returns true if the subscription was waiting.
    pub fn cancel_requests(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        let waiting = self.waiting_subscriptions.contains(subscription);
        self.waiting_subscriptions.retain(|s| s != subscription);
        self.duplicate_requests.retain(|s| s != subscription);
        waiting
    }

    pub fn messages_to_deliver(&self) -> &MessageTracker {
        &self.messages_to_deliver
    }

    pub fn messages_to_redeliver(&self) -> &VecDeque<MessageIdentifier> {
        &self.messages_to_redeliver
    }

    pub fn waiting_subscriptions(&self) -> &VecDeque<SubscriptionIdentifier> {
        &self.waiting_subscriptions
    }

    pub fn num_messages_received(&self) -> u64 {
        self.num_messages_received
    }

    pub fn num_messages_delivered(&self) -> u64 {
        self.num_messages_delivered
    }

    pub fn pending_count(&self) -> usize {
        self.messages_to_deliver.size() + self.messages_to_redeliver.len()
    }

    pub fn last_sequence_for_partition(&self, partition: PartitionId) -> Option<i64> {
        self.last_message_sequence_numbers.get(&partition).copied()
    }

    /// A delivery pass would hand out at least one message
    pub fn has_deliverable_work(&self) -> bool {
        !self.waiting_subscriptions.is_empty()
            && (!self.messages_to_deliver.is_empty() || !self.messages_to_redeliver.is_empty())
    }

    /// Take newly exposed messages, skipping any at or below the last sequence seen
    ///
    /// Returns the identifiers actually accepted.
    pub fn on_accept_message(&mut self, tracker: &MessageTracker) -> MessageTracker {
        let mut accepted = MessageTracker::new();
        for id in tracker.iter() {
            let partition = id.partition_id();
            if let Some(&last) = self.last_message_sequence_numbers.get(&partition) {
                if id.sequence_number() <= last {
                    log::warn!(
                        "Queue {} received message {} out of sequence (last seen {})",
                        self.identifier,
                        id,
                        last
                    );
                    continue;
                }
            }
            self.last_message_sequence_numbers
                .insert(partition, id.sequence_number());
            self.messages_to_deliver.add(id);
            accepted.add(id);
            self.num_messages_received += 1;
        }
        accepted
    }

    /// Register a subscriber's readiness for messages
    ///
    /// A second request from a subscription that is already waiting is parked
    /// and promoted once the first one has been satisfied.
    pub fn request_message(&mut self, subscription: SubscriptionIdentifier) {
        if self.waiting_subscriptions.contains(&subscription) {
            self.duplicate_requests.push_back(subscription);
        } else {
            self.waiting_subscriptions.push_back(subscription);
        }
    }

    /// Plan a round-robin assignment of pending messages to waiting subscriptions
    ///
    /// Redeliveries go first and bypass the sequence check. Nothing is mutated.
    pub fn do_delivery(&self) -> QueueDeliveryResults {
        let mut waiting: Vec<&SubscriptionIdentifier> = Vec::new();
        for subscription in &self.waiting_subscriptions {
            if self.subscriptions.contains(subscription) && !waiting.contains(&subscription) {
                waiting.push(subscription);
            }
        }
        if waiting.is_empty() {
            return QueueDeliveryResults::default();
        }

        let redeliver: BTreeSet<MessageIdentifier> =
            self.messages_to_redeliver.iter().copied().collect();
        let candidates = self.messages_to_redeliver.iter().copied().chain(
            self.messages_to_deliver
                .iter()
                .filter(|id| !redeliver.contains(id)),
        );

        let deliveries = candidates
            .enumerate()
            .map(|(index, message_id)| QueueDelivery {
                subscription: waiting[index % waiting.len()].clone(),
                message_id,
                outcome: DeliveryOutcome::Pending,
            })
            .collect();

        QueueDeliveryResults { deliveries }
    }

    fn remove_pending(&mut self, message_id: MessageIdentifier) {
        self.messages_to_deliver.remove(message_id);
        self.messages_to_redeliver.retain(|id| *id != message_id);
    }

    /// Apply the outcome of a delivery pass; returns the number delivered
    pub fn process_delivery_results(&mut self, results: &QueueDeliveryResults) -> usize {
        let mut delivered = 0;
        let mut failed_subscriptions: BTreeSet<SubscriptionIdentifier> = BTreeSet::new();

        for delivery in results.deliveries() {
            match delivery.outcome {
                DeliveryOutcome::Delivered => {
                    self.remove_pending(delivery.message_id);
                    self.num_messages_delivered += 1;
                    delivered += 1;
                }
                DeliveryOutcome::Discarded => self.remove_pending(delivery.message_id),
                DeliveryOutcome::Failed => {
                    self.messages_to_deliver.remove(delivery.message_id);
                    if !self.messages_to_redeliver.contains(&delivery.message_id) {
                        self.messages_to_redeliver.push_back(delivery.message_id);
                    }
                    failed_subscriptions.insert(delivery.subscription.clone());
                }
                DeliveryOutcome::Pending => {}
            }
        }

        for subscription in &failed_subscriptions {
            log::warn!(
                "Queue {} dropping waiting subscription {} after failed delivery",
                self.identifier,
                subscription
            );
            self.waiting_subscriptions.retain(|s| s != subscription);
            self.duplicate_requests.retain(|s| s != subscription);
        }

        for subscription in results.satisfied_subscriptions() {
            if failed_subscriptions.contains(&subscription) {
                continue;
            }
            if let Some(position) = self
                .waiting_subscriptions
                .iter()
                .position(|s| *s == subscription)
            {
                self.waiting_subscriptions.remove(position);
                if let Some(parked) = self
                    .duplicate_requests
                    .iter()
                    .position(|s| *s == subscription)
                {
                    self.duplicate_requests.remove(parked);
                    self.waiting_subscriptions.push_back(subscription);
                }
            }
        }

        delivered
    }

    /// Put a subscriber's rolled-back messages at the front of the redelivery list
    pub fn rollback_messages(&mut self, subscription: &SubscriptionIdentifier, tracker: &MessageTracker) {
        let ids: Vec<MessageIdentifier> = tracker.iter().collect();
        log::debug!(
            "Queue {} rolling back {} messages from {}",
            self.identifier,
            ids.len(),
            subscription
        );
        for id in ids.into_iter().rev() {
            self.messages_to_deliver.remove(id);
            if !self.messages_to_redeliver.contains(&id) {
                self.messages_to_redeliver.push_front(id);
            }
        }
    }
}
