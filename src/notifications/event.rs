//! Update types carried by the notification system

use std::time::SystemTime;
use strum_macros::Display;

use crate::messaging::identifier::SubscriptionIdentifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SubscriptionUpdateKind {
    /// The subscription entry was inserted or changed
    Changed,
    /// The subscription entry is gone (unsubscribed, expired, destination removed)
    Removed,
}

/// A committed change to a subscription entry
#[derive(Clone, Debug)]
pub struct SubscriptionUpdate {
    pub kind: SubscriptionUpdateKind,
    pub subscription: SubscriptionIdentifier,
    pub timestamp: SystemTime,
}

impl SubscriptionUpdate {
    pub fn new(kind: SubscriptionUpdateKind, subscription: SubscriptionIdentifier) -> Self {
        Self {
            kind,
            subscription,
            timestamp: SystemTime::now(),
        }
    }
}

/// Which updates a receiver wants to see
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateFilter {
    All,
    Subscription(SubscriptionIdentifier),
}

impl UpdateFilter {
    pub fn accepts(&self, update: &SubscriptionUpdate) -> bool {
        match self {
            UpdateFilter::All => true,
            UpdateFilter::Subscription(id) => *id == update.subscription,
        }
    }
}
