//! Error types for the notification system

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Failed to publish {update_kind} update to {} receivers: {failed_receivers:?}", .failed_receivers.len())]
    PublishFailed {
        update_kind: String,
        failed_receivers: Vec<String>,
    },

    #[error("Notification registry unavailable: {message}")]
    RegistryUnavailable { message: String },
}

impl crate::core::error_handling::ContextualError for NotificationError {
    fn is_user_actionable(&self) -> bool {
        false // All notification errors are system-level
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
