//! Message entity stored in the Messages cache

use std::collections::BTreeSet;

use crate::messaging::identifier::{
    MessageIdentifier, MessageKey, PublishRequestIdentifier, SubscriptionIdentifier,
};

/// A published payload plus its visibility and acknowledgement bookkeeping
///
/// `acknowledged_by ⊆ delivered_to ⊆ visible_to` holds after every mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    key: MessageKey,
    payload: Vec<u8>,
    request_id: PublishRequestIdentifier,
    visible: bool,
    visible_to: BTreeSet<SubscriptionIdentifier>,
    delivered_to: BTreeSet<SubscriptionIdentifier>,
    acknowledged_by: BTreeSet<SubscriptionIdentifier>,
}

impl Message {
    pub fn new(key: MessageKey, payload: Vec<u8>, request_id: PublishRequestIdentifier) -> Self {
        Self {
            key,
            payload,
            request_id,
            visible: false,
            visible_to: BTreeSet::new(),
            delivered_to: BTreeSet::new(),
            acknowledged_by: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> &MessageKey {
        &self.key
    }

    pub fn message_id(&self) -> MessageIdentifier {
        self.key.message_id()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn request_id(&self) -> &PublishRequestIdentifier {
        &self.request_id
    }

    /// True once exposure has completed
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn visible_to(&self) -> &BTreeSet<SubscriptionIdentifier> {
        &self.visible_to
    }

    pub fn delivered_to(&self) -> &BTreeSet<SubscriptionIdentifier> {
        &self.delivered_to
    }

    pub fn acknowledged_by(&self) -> &BTreeSet<SubscriptionIdentifier> {
        &self.acknowledged_by
    }

    /// Topic exposure: the message becomes visible to every accepting subscription
    pub fn make_visible_to(&mut self, subscriptions: impl IntoIterator<Item = SubscriptionIdentifier>) {
        self.visible_to.extend(subscriptions);
        self.visible = true;
    }

    /// Queue exposure: the queue has taken the message; visibility follows delivery
    pub fn mark_exposed(&mut self) {
        self.visible = true;
    }

    /// Queue delivery hands the message to exactly one subscription
    pub fn make_visible_to_subscription(&mut self, subscription: SubscriptionIdentifier) {
        self.visible_to.insert(subscription);
    }

    /// Record that the subscriber has read the message
    pub fn mark_delivered(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        if !self.visible_to.contains(subscription) {
            return false;
        }
        self.delivered_to.insert(subscription.clone());
        true
    }

    pub fn acknowledge(&mut self, subscription: &SubscriptionIdentifier) -> bool {
        if !self.visible_to.contains(subscription) {
            return false;
        }
        self.delivered_to.insert(subscription.clone());
        self.acknowledged_by.insert(subscription.clone())
    }

    /// Topic rollback: the message stays visible and will be read again
    pub fn rollback_delivery(&mut self, subscription: &SubscriptionIdentifier) {
        if !self.acknowledged_by.contains(subscription) {
            self.delivered_to.remove(subscription);
        }
    }

    /// Queue rollback: the subscription loses the message so another can take it
    pub fn revoke_visibility(&mut self, subscription: &SubscriptionIdentifier) {
        self.visible_to.remove(subscription);
        self.delivered_to.remove(subscription);
        self.acknowledged_by.remove(subscription);
    }

    /// Every subscription the message was made visible to has acknowledged it
    pub fn is_fully_acknowledged(&self) -> bool {
        !self.visible_to.is_empty() && self.visible_to == self.acknowledged_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::identifier::Identifier;

    fn message() -> Message {
        Message::new(
            MessageKey::new(Identifier::from("prices"), MessageIdentifier::new(0, 1)),
            b"tick".to_vec(),
            PublishRequestIdentifier::new(Identifier::from("p"), 1),
        )
    }

    fn sub(name: &str) -> SubscriptionIdentifier {
        SubscriptionIdentifier::new(Identifier::from("prices"), Identifier::from(name))
    }

    #[test]
    fn test_acknowledgement_requires_visibility() {
        let mut msg = message();
        assert!(!msg.acknowledge(&sub("s1")));
        assert!(!msg.mark_delivered(&sub("s1")));
        assert!(!msg.is_fully_acknowledged());
    }

    #[test]
    fn test_fully_acknowledged_when_every_visible_subscription_acks() {
        let mut msg = message();
        msg.make_visible_to([sub("s1"), sub("s2")]);
        assert!(msg.is_visible());

        assert!(msg.mark_delivered(&sub("s1")));
        assert!(msg.acknowledge(&sub("s1")));
        assert!(!msg.is_fully_acknowledged());

        assert!(msg.acknowledge(&sub("s2")));
        assert!(msg.is_fully_acknowledged());
        assert!(msg.acknowledged_by().is_subset(msg.delivered_to()));
        assert!(msg.delivered_to().is_subset(msg.visible_to()));
    }

    #[test]
    fn test_rollback_and_revoke() {
        let mut msg = message();
        msg.make_visible_to([sub("s1")]);
        msg.mark_delivered(&sub("s1"));
        msg.rollback_delivery(&sub("s1"));
        assert!(msg.delivered_to().is_empty());
        assert!(msg.visible_to().contains(&sub("s1")));

        msg.mark_delivered(&sub("s1"));
        msg.revoke_visibility(&sub("s1"));
        assert!(msg.visible_to().is_empty());
        assert!(msg.delivered_to().is_empty());
        // Still exposed; the queue will hand it to someone else
        assert!(msg.is_visible());
    }
}
