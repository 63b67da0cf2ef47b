//! Generic error handling utilities
//!
//! Distinguishes errors a caller can act on (unknown destination, lost
//! subscription, bad configuration) from system failures (poisoned locks,
//! runtime problems) so the binary and embedding applications log them with
//! the right amount of detail.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the caller can act on
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors log their own message; system errors log the
/// operation context. Full details always go to debug level.
///
/// # Examples
/// ```rust,no_run
/// use gridmq::core::error_handling::log_error_with_context;
/// use gridmq::messaging::api::MessagingError;
///
/// let error = MessagingError::DestinationNotFound { destination: "orders".into() };
/// log_error_with_context(&error, "Publishing to destination");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct UnknownDestination {
        message: String,
    }

    impl fmt::Display for UnknownDestination {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for UnknownDestination {}

    impl ContextualError for UnknownDestination {
        fn is_user_actionable(&self) -> bool {
            true
        }

        fn user_message(&self) -> Option<&str> {
            Some(&self.message)
        }
    }

    #[derive(Debug)]
    struct PoisonedRegistry;

    impl fmt::Display for PoisonedRegistry {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "registry lock poisoned")
        }
    }

    impl std::error::Error for PoisonedRegistry {}

    impl ContextualError for PoisonedRegistry {
        fn is_user_actionable(&self) -> bool {
            false
        }

        fn user_message(&self) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_user_actionable_error_shows_specific_message() {
        let error = UnknownDestination {
            message: "destination 'orders' does not exist".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(
            error.user_message(),
            Some("destination 'orders' does not exist")
        );
        log_error_with_context(&error, "Publishing");
    }

    #[test]
    fn test_system_error_uses_generic_context() {
        let error = PoisonedRegistry;

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
        log_error_with_context(&error, "Exposing messages");
    }
}
