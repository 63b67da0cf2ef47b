//! SubscriptionNotifier implementation

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::core::sync::handle_mutex_poison;
use crate::messaging::identifier::SubscriptionIdentifier;
use crate::notifications::error::NotificationError;
use crate::notifications::event::{SubscriptionUpdate, SubscriptionUpdateKind, UpdateFilter};
use crate::notifications::traits::SubscriberStatistics;

/// Subscriptions with a `Changed` update queued but not yet taken
type PendingChanges = Arc<Mutex<BTreeSet<SubscriptionIdentifier>>>;

struct ReceiverInfo {
    filter: UpdateFilter,
    source: String,
    sender: UnboundedSender<SubscriptionUpdate>,
    statistics: Arc<SubscriberStatistics>,
    pending_changes: PendingChanges,
}

impl ReceiverInfo {
    /// False when a `Changed` for the same subscription is still queued
    fn claim_change(&self, update: &SubscriptionUpdate) -> bool {
        if update.kind != SubscriptionUpdateKind::Changed {
            return true;
        }
        match self.pending_changes.lock() {
            Ok(mut pending) => pending.insert(update.subscription.clone()),
            Err(_) => true,
        }
    }

    fn release_change(&self, update: &SubscriptionUpdate) {
        if let Ok(mut pending) = self.pending_changes.lock() {
            pending.remove(&update.subscription);
        }
    }
}

/// Receiving end handed to a subscriber; keeps statistics in step
pub struct UpdateReceiver {
    receiver: UnboundedReceiver<SubscriptionUpdate>,
    statistics: Arc<SubscriberStatistics>,
    pending_changes: PendingChanges,
}

impl UpdateReceiver {
    /// Wait for the next update; `None` once the notifier dropped the sender
    pub async fn recv(&mut self) -> Option<SubscriptionUpdate> {
        let update = self.receiver.recv().await;
        self.taken(update)
    }

    /// Take an already-queued update without waiting
    pub fn try_recv(&mut self) -> Option<SubscriptionUpdate> {
        let update = self.receiver.try_recv().ok();
        self.taken(update)
    }

    fn taken(&self, update: Option<SubscriptionUpdate>) -> Option<SubscriptionUpdate> {
        if let Some(update) = &update {
            if update.kind == SubscriptionUpdateKind::Changed {
                if let Ok(mut pending) = self.pending_changes.lock() {
                    pending.remove(&update.subscription);
                }
            }
            self.statistics.decrement_queue_size();
            self.statistics.record_message_processed();
        }
        update
    }

    pub fn statistics(&self) -> &SubscriberStatistics {
        &self.statistics
    }
}

/// Fans subscription updates out to waiting subscribers
///
/// Receivers whose channel has closed are pruned on the next publish. A
/// `Changed` update is queued at most once per receiver and subscription
/// until the receiver takes it, so an idle receiver's queue stays bounded.
#[derive(Default)]
pub struct SubscriptionNotifier {
    receivers: Mutex<HashMap<String, ReceiverInfo>>,
}

impl SubscriptionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, ReceiverInfo>>, NotificationError> {
        handle_mutex_poison(self.receivers.lock(), |message| {
            NotificationError::RegistryUnavailable { message }
        })
    }

    /// Register a receiver; an existing registration with the same id is replaced
    pub fn subscribe(
        &self,
        receiver_id: String,
        filter: UpdateFilter,
        source: String,
    ) -> Result<UpdateReceiver, NotificationError> {
        let (sender, receiver) = unbounded_channel();
        let statistics = Arc::new(SubscriberStatistics::new());
        let pending_changes = PendingChanges::default();

        let info = ReceiverInfo {
            filter,
            source: source.clone(),
            sender,
            statistics: Arc::clone(&statistics),
            pending_changes: Arc::clone(&pending_changes),
        };

        if let Some(existing) = self.lock()?.insert(receiver_id.clone(), info) {
            log::warn!(
                "Receiver '{}' replaced existing registration (source: {} -> {})",
                receiver_id,
                existing.source,
                source
            );
        }

        Ok(UpdateReceiver {
            receiver,
            statistics,
            pending_changes,
        })
    }

    pub fn unsubscribe(&self, receiver_id: &str) -> Result<bool, NotificationError> {
        Ok(self.lock()?.remove(receiver_id).is_some())
    }

    pub fn receiver_count(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn has_receiver(&self, receiver_id: &str) -> bool {
        self.lock()
            .map(|r| r.contains_key(receiver_id))
            .unwrap_or(false)
    }

    pub fn receiver_queue_size(&self, receiver_id: &str) -> Option<usize> {
        self.lock()
            .ok()?
            .get(receiver_id)
            .map(|info| info.statistics.queue_size())
    }

    /// Deliver an update to every matching receiver
    pub fn publish(&self, update: SubscriptionUpdate) -> Result<(), NotificationError> {
        let mut receivers = self.lock()?;
        let mut failed_receivers = Vec::new();

        for (receiver_id, info) in receivers.iter() {
            if !info.filter.accepts(&update) {
                continue;
            }
            if !info.claim_change(&update) {
                log::trace!("Coalesced update for {} on '{}'", update.subscription, receiver_id);
                continue;
            }
            info.statistics.increment_queue_size();
            if info.sender.send(update.clone()).is_err() {
                info.release_change(&update);
                failed_receivers.push(receiver_id.clone());
            }
        }

        for receiver_id in &failed_receivers {
            receivers.remove(receiver_id);
        }

        if !failed_receivers.is_empty() {
            return Err(NotificationError::PublishFailed {
                update_kind: update.kind.to_string(),
                failed_receivers,
            });
        }
        Ok(())
    }
}
