//! Subscription to a topic
//!
//! A message is in exactly one of two trackers: visible (exposed, not read)
//! or delivered (read, not committed).

use crate::messaging::identifier::MessageIdentifier;
use crate::messaging::subscription::LeasedSubscription;
use crate::messaging::tracker::MessageTracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSubscription {
    leased: LeasedSubscription,
    delivered: MessageTracker,
}

impl TopicSubscription {
    pub fn new(leased: LeasedSubscription) -> Self {
        Self {
            leased,
            delivered: MessageTracker::new(),
        }
    }

    pub fn leased(&self) -> &LeasedSubscription {
        &self.leased
    }

    pub fn leased_mut(&mut self) -> &mut LeasedSubscription {
        &mut self.leased
    }

    pub fn delivered_messages(&self) -> &MessageTracker {
        &self.delivered
    }

    /// Offer an exposure batch; `None` when the subscription is disabled
    pub fn on_accept_message(&mut self, tracker: &MessageTracker) -> Option<MessageTracker> {
        self.leased.accept_batch(tracker)
    }

    /// Move a message from visible to delivered once the subscriber has read it
    pub fn mark_read(&mut self, id: MessageIdentifier) -> bool {
        if !self.leased.visible_messages_mut().remove(id) {
            return false;
        }
        self.delivered.add(id);
        true
    }

    /// Forget a visible message that no longer exists
    pub fn discard(&mut self, id: MessageIdentifier) -> bool {
        self.leased.visible_messages_mut().remove(id)
    }

    /// Clear the delivered tracker, returning what was committed
    pub fn commit(&mut self) -> MessageTracker {
        let committed = std::mem::take(&mut self.delivered);
        self.leased.record_acknowledged(committed.size());
        committed
    }

    /// Return delivered messages to the visible tracker
    pub fn rollback(&mut self) -> MessageTracker {
        let rolled_back = std::mem::take(&mut self.delivered);
        self.leased.visible_messages_mut().add_all(&rolled_back);
        rolled_back
    }
}
