//! Shared helpers for the integration suites

use std::sync::Arc;
use std::time::Duration;

use gridmq::core::config::MessagingConfig;
use gridmq::messaging::api::{MessagingContext, MessagingSession, Subscriber};

pub fn config() -> MessagingConfig {
    MessagingConfig {
        partition_count: 11,
        lease_duration_ms: 1_000,
        lease_renew_interval_ms: 100,
        lease_sweep_interval_ms: 50,
        ..MessagingConfig::default()
    }
}

pub fn context() -> Arc<MessagingContext> {
    MessagingContext::new(config()).expect("messaging context")
}

pub fn session(context: &Arc<MessagingContext>) -> MessagingSession {
    MessagingSession::new(Arc::clone(context))
}

/// Next payload as text, failing the test after two seconds
pub async fn next_text(subscriber: &mut Subscriber) -> String {
    let payload = tokio::time::timeout(Duration::from_secs(2), subscriber.get_message())
        .await
        .expect("timed out waiting for a message")
        .expect("subscriber failed");
    String::from_utf8(payload).expect("utf-8 payload")
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
