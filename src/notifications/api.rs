//! Public API for the notification system
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Core event types and enums
pub use crate::notifications::event::{SubscriptionUpdate, SubscriptionUpdateKind, UpdateFilter};

// Manager and utilities
pub use crate::notifications::error::NotificationError;
pub use crate::notifications::manager::{SubscriptionNotifier, UpdateReceiver};

// Statistics
pub use crate::notifications::traits::SubscriberStatistics;
