//! Shared helpers for the runtime-driven messaging suites

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::MessagingConfig;
use crate::messaging::api::{MessagingContext, MessagingSession};

/// Short leases and a fast sweeper so expiry tests finish quickly
pub(crate) fn fast_config() -> MessagingConfig {
    MessagingConfig {
        partition_count: 7,
        lease_duration_ms: 600,
        lease_renew_interval_ms: 100,
        lease_sweep_interval_ms: 50,
        ..MessagingConfig::default()
    }
}

pub(crate) fn session() -> MessagingSession {
    let context = MessagingContext::new(fast_config()).unwrap();
    MessagingSession::new(context)
}

pub(crate) fn session_on(context: &Arc<MessagingContext>) -> MessagingSession {
    MessagingSession::new(Arc::clone(context))
}

/// Poll `condition` until it holds or five seconds pass
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
