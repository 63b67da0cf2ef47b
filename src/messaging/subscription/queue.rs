//! Subscription to a queue
//!
//! The visible tracker holds every message the queue has handed to this
//! subscription and that has not been acknowledged or rolled back yet.

use crate::messaging::identifier::MessageIdentifier;
use crate::messaging::subscription::LeasedSubscription;
use crate::messaging::tracker::MessageTracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueSubscription {
    leased: LeasedSubscription,
}

impl QueueSubscription {
    pub fn new(leased: LeasedSubscription) -> Self {
        Self { leased }
    }

    pub fn leased(&self) -> &LeasedSubscription {
        &self.leased
    }

    pub fn leased_mut(&mut self) -> &mut LeasedSubscription {
        &mut self.leased
    }

    /// Take a message chosen by the queue's delivery pass
    ///
    /// Redelivered identifiers are accepted even if an equal or higher
    /// sequence was seen before. A parked subscription takes nothing.
    pub fn on_accept_message(&mut self, id: MessageIdentifier) -> bool {
        if self.leased.lease().is_suspended() {
            return false;
        }
        self.leased.accept_one(id)
    }

    /// Undo an accept whose message disappeared before it was stamped
    pub fn withdraw(&mut self, id: MessageIdentifier) -> bool {
        self.leased.visible_messages_mut().remove(id)
    }

    /// Drop committed messages; returns how many were held
    pub fn acknowledge(&mut self, ids: &MessageTracker) -> usize {
        let held = ids
            .iter()
            .filter(|id| self.leased.visible_messages().contains(*id))
            .count();
        self.leased.visible_messages_mut().remove_all(ids);
        self.leased.record_acknowledged(held);
        held
    }

    /// Give messages back to the queue; returns the ones that were held
    pub fn release(&mut self, ids: &MessageTracker) -> MessageTracker {
        self.leased
            .visible_messages_mut()
            .drain_where(|id| ids.contains(id))
            .collect()
    }
}
