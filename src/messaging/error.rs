//! Messaging Error Types

use crate::core::config::ConfigError;
use crate::grid::api::GridError;
use crate::messaging::destination::DestinationKind;
use crate::messaging::identifier::SubscriptionIdentifier;
use crate::notifications::api::NotificationError;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Subscription {subscription} is no longer available")]
    SubscriptionLost { subscription: SubscriptionIdentifier },

    #[error("Subscriber for {subscription} was interrupted while waiting for a message")]
    SubscriberInterrupted { subscription: SubscriptionIdentifier },

    #[error("Destination not found: {destination}")]
    DestinationNotFound { destination: String },

    #[error("Destination '{destination}' is a {actual}, not a {expected}")]
    DestinationTypeMismatch {
        destination: String,
        expected: DestinationKind,
        actual: DestinationKind,
    },

    #[error("Subscription not found: {subscription}")]
    SubscriptionNotFound { subscription: SubscriptionIdentifier },

    #[error("Grid operation failed: {0}")]
    Grid(#[from] GridError),

    #[error("Notification failed: {0}")]
    Notification(#[from] NotificationError),

    #[error("Runtime error: {message}")]
    Runtime { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl crate::core::error_handling::ContextualError for MessagingError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            MessagingError::SubscriptionLost { .. }
                | MessagingError::SubscriberInterrupted { .. }
                | MessagingError::DestinationNotFound { .. }
                | MessagingError::DestinationTypeMismatch { .. }
                | MessagingError::SubscriptionNotFound { .. }
                | MessagingError::Configuration(_)
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            MessagingError::SubscriptionLost { .. } => {
                Some("the subscription was removed; subscribe again to continue")
            }
            MessagingError::SubscriberInterrupted { .. } => {
                Some("the subscriber was interrupted and can no longer be used")
            }
            MessagingError::DestinationNotFound { .. } => {
                Some("the destination does not exist; create it first")
            }
            MessagingError::DestinationTypeMismatch { .. } => {
                Some("a destination with that name already exists with a different type")
            }
            MessagingError::SubscriptionNotFound { .. } => Some("no such subscription"),
            MessagingError::Configuration(inner) => {
                crate::core::error_handling::ContextualError::user_message(inner)
            }
            _ => None,
        }
    }
}

/// Result type for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
