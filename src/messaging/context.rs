//! Messaging context: the caches, registries and background tasks of one member
//!
//! Everything that would otherwise be process-wide state lives here, so
//! several independent contexts can coexist (one per test, for instance).
//! Components hold a `Weak` back-reference; dropping the last `Arc` stops
//! the engines and the lease sweeper.

use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::config::MessagingConfig;
use crate::core::time::now_millis;
use crate::grid::api::{
    Lease, LeaseCoordinator, LeaseListener, LocalLeaseCoordinator, PartitionEventKind,
    PartitionId, PartitionService, PartitionedCache,
};
use crate::messaging::destination::{Destination, DestinationKind, DestinationStats};
use crate::messaging::engine::{delivery, EngineRegistry};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::event_manager::MessageEventManager;
use crate::messaging::expose::MessagesToExpose;
use crate::messaging::identifier::{Identifier, MessageKey, SubscriptionIdentifier};
use crate::messaging::message::Message;
use crate::messaging::processor_state::ProcessorStateManager;
use crate::messaging::publisher::MessagePublisherManager;
use crate::messaging::subscription::Subscription;
use crate::messaging::tracker::MessageTracker;
use crate::notifications::api::{SubscriptionNotifier, SubscriptionUpdate, SubscriptionUpdateKind};

/// Entries of one partition on their way between members
#[derive(Clone, Debug, Default)]
pub struct PartitionTransfer {
    pub partition: PartitionId,
    pub destinations: Vec<(Identifier, Destination)>,
    pub subscriptions: Vec<(SubscriptionIdentifier, Subscription)>,
    pub messages: Vec<(MessageKey, Message)>,
}

impl PartitionTransfer {
    pub fn len(&self) -> usize {
        self.destinations.len() + self.subscriptions.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a subscriber found when it tried to read a message
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Read(Vec<u8>),
    /// Exposure has not yet made the message visible to this subscription
    NotReady,
    Missing,
}

pub struct MessagingContext {
    config: MessagingConfig,
    destinations: PartitionedCache<Identifier, Destination>,
    messages: PartitionedCache<MessageKey, Message>,
    subscriptions: PartitionedCache<SubscriptionIdentifier, Subscription>,
    partition_service: PartitionService,
    lease_coordinator: LocalLeaseCoordinator<SubscriptionIdentifier>,
    publishers: MessagePublisherManager,
    messages_to_expose: MessagesToExpose,
    processor_states: ProcessorStateManager,
    engines: EngineRegistry,
    notifier: SubscriptionNotifier,
    event_manager: Arc<MessageEventManager>,
    runtime: Handle,
    self_ref: Weak<MessagingContext>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MessagingContext {
    /// Build a context on the current tokio runtime
    pub fn new(config: MessagingConfig) -> MessagingResult<Arc<Self>> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| MessagingError::Runtime {
            message: format!("messaging requires a tokio runtime: {}", e),
        })?;
        let partition_count = config.partition_count;

        let context = Arc::new_cyclic(|weak: &Weak<MessagingContext>| MessagingContext {
            config,
            destinations: PartitionedCache::new("destinations", partition_count),
            messages: PartitionedCache::new("messages", partition_count),
            subscriptions: PartitionedCache::new("subscriptions", partition_count),
            partition_service: PartitionService::new(),
            lease_coordinator: LocalLeaseCoordinator::new(),
            publishers: MessagePublisherManager::new(),
            messages_to_expose: MessagesToExpose::new(),
            processor_states: ProcessorStateManager::new(),
            engines: EngineRegistry::new(weak.clone(), runtime.clone()),
            notifier: SubscriptionNotifier::new(),
            event_manager: Arc::new(MessageEventManager::new(weak.clone())),
            runtime: runtime.clone(),
            self_ref: weak.clone(),
            sweeper: Mutex::new(None),
        });

        context.destinations.add_listener(context.event_manager.clone())?;
        context.messages.add_listener(context.event_manager.clone())?;
        context.subscriptions.add_listener(context.event_manager.clone())?;
        context
            .partition_service
            .add_listener(context.event_manager.clone())?;
        context.start_lease_sweeper()?;

        log::info!(
            "Messaging context started with {} partitions",
            partition_count
        );
        Ok(context)
    }

    fn start_lease_sweeper(&self) -> MessagingResult<()> {
        let weak = self.self_ref.clone();
        let interval = self.config.lease_sweep_interval();
        let task = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(context) = weak.upgrade() else {
                    break;
                };
                match context.lease_coordinator.expire_due(now_millis()) {
                    Ok(expired) if !expired.is_empty() => {
                        log::debug!("Lease sweep expired {} subscriptions", expired.len());
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Lease sweep failed: {}", e),
                }
            }
        });

        let mut sweeper = crate::core::sync::handle_mutex_poison(self.sweeper.lock(), |message| {
            MessagingError::Runtime { message }
        })?;
        *sweeper = Some(task);
        Ok(())
    }

    /// Stop background work: the lease sweeper and every engine
    pub fn shutdown(&self) -> MessagingResult<()> {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(task) = sweeper.take() {
                task.abort();
            }
        }
        let disposed = self.engines.dispose_all()?;
        log::info!("Messaging context shut down ({} engines disposed)", disposed);
        Ok(())
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    pub fn destinations(&self) -> &PartitionedCache<Identifier, Destination> {
        &self.destinations
    }

    pub fn messages(&self) -> &PartitionedCache<MessageKey, Message> {
        &self.messages
    }

    pub fn subscriptions(&self) -> &PartitionedCache<SubscriptionIdentifier, Subscription> {
        &self.subscriptions
    }

    pub fn partition_service(&self) -> &PartitionService {
        &self.partition_service
    }

    pub fn lease_coordinator(&self) -> &LocalLeaseCoordinator<SubscriptionIdentifier> {
        &self.lease_coordinator
    }

    pub fn publishers(&self) -> &MessagePublisherManager {
        &self.publishers
    }

    pub fn messages_to_expose(&self) -> &MessagesToExpose {
        &self.messages_to_expose
    }

    pub fn processor_states(&self) -> &ProcessorStateManager {
        &self.processor_states
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn notifier(&self) -> &SubscriptionNotifier {
        &self.notifier
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn weak(&self) -> Weak<MessagingContext> {
        self.self_ref.clone()
    }

    /// Start a delivery task for a queue unless one is already scheduled or running
    pub fn schedule_delivery(&self, destination: &Identifier) -> MessagingResult<()> {
        if self.processor_states.try_schedule(destination)? {
            log::trace!("Scheduling delivery for {}", destination);
            self.runtime.spawn(delivery::delivery_task(
                self.self_ref.clone(),
                destination.clone(),
            ));
        }
        Ok(())
    }

    pub(crate) fn notify(&self, subscription: &SubscriptionIdentifier, kind: SubscriptionUpdateKind) {
        if let Err(e) = self
            .notifier
            .publish(SubscriptionUpdate::new(kind, subscription.clone()))
        {
            log::debug!("Subscription update for {} not fully delivered: {}", subscription, e);
        }
    }

    pub(crate) fn notify_changed(&self, subscription: &SubscriptionIdentifier) {
        self.notify(subscription, SubscriptionUpdateKind::Changed);
    }

    pub(crate) fn register_lease(&self, subscription: &SubscriptionIdentifier, lease: Lease) -> MessagingResult<()> {
        let listener: Arc<dyn LeaseListener<SubscriptionIdentifier>> = self.event_manager.clone();
        self.lease_coordinator
            .register_lease(subscription.clone(), lease, listener)?;
        Ok(())
    }

    pub(crate) fn deregister_lease(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<()> {
        self.lease_coordinator.deregister_lease(subscription)?;
        Ok(())
    }

    pub fn destination_kind(&self, destination: &Identifier) -> MessagingResult<DestinationKind> {
        self.destinations
            .get(destination)?
            .map(|entry| entry.kind())
            .ok_or_else(|| MessagingError::DestinationNotFound {
                destination: destination.to_string(),
            })
    }

    pub fn destination_stats(&self, destination: &Identifier) -> MessagingResult<DestinationStats> {
        self.destinations
            .get(destination)?
            .map(|entry| entry.stats())
            .ok_or_else(|| MessagingError::DestinationNotFound {
                destination: destination.to_string(),
            })
    }

    /// Highest sequence number already seen for `partition` by the destination,
    /// its subscriptions or the pending-exposure tracker
    pub(crate) fn last_sequence_observed(
        &self,
        destination: &Identifier,
        partition: PartitionId,
    ) -> MessagingResult<Option<i64>> {
        let Some(entry) = self.destinations.get(destination)? else {
            return Ok(None);
        };
        let mut last = entry.last_sequence_for_partition(partition);
        for subscription in entry.subscriptions() {
            if let Ok(Some(subscription)) = self.subscriptions.get(subscription) {
                last = last.max(subscription.leased().last_sequence_for_partition(partition));
            }
        }
        let pending = self.messages_to_expose.tracker(destination)?;
        Ok(last.max(pending.last_sequence_for_partition(partition)))
    }

    fn message_keys(subscription: &SubscriptionIdentifier, ids: &MessageTracker) -> Vec<MessageKey> {
        ids.iter()
            .map(|id| MessageKey::new(subscription.destination().clone(), id))
            .collect()
    }

    /// Mark a message read by `subscription` and return its payload
    pub(crate) fn read_message(
        &self,
        key: &MessageKey,
        subscription: &SubscriptionIdentifier,
    ) -> MessagingResult<ReadOutcome> {
        Ok(self.messages.invoke(key, |entry| match entry {
            Some(message) => {
                if message.mark_delivered(subscription) {
                    ReadOutcome::Read(message.payload().to_vec())
                } else {
                    ReadOutcome::NotReady
                }
            }
            None => ReadOutcome::Missing,
        })?)
    }

    /// Acknowledge messages for `subscription`, deleting the fully acknowledged ones
    ///
    /// Returns the number of messages deleted.
    pub(crate) fn acknowledge_messages(
        &self,
        subscription: &SubscriptionIdentifier,
        ids: &MessageTracker,
    ) -> MessagingResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .messages
            .invoke_all(&Self::message_keys(subscription, ids), |_, entry| {
                let fully_acknowledged = match entry.as_mut() {
                    Some(message) => {
                        message.acknowledge(subscription);
                        message.is_fully_acknowledged()
                    }
                    None => return false,
                };
                if fully_acknowledged {
                    *entry = None;
                }
                fully_acknowledged
            })?;
        Ok(deleted.into_iter().filter(|deleted| *deleted).count())
    }

    /// Commit everything a topic subscriber has read
    pub(crate) fn commit_topic(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<usize> {
        let committed = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(Subscription::Topic(topic)) => Some(topic.commit()),
            _ => None,
        })?;
        let committed = committed.ok_or_else(|| MessagingError::SubscriptionLost {
            subscription: subscription.clone(),
        })?;
        self.acknowledge_messages(subscription, &committed)?;
        Ok(committed.size())
    }

    /// Commit the given messages read from a queue
    pub(crate) fn commit_queue(
        &self,
        subscription: &SubscriptionIdentifier,
        ids: &MessageTracker,
    ) -> MessagingResult<usize> {
        let held = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(Subscription::Queue(queue)) => Some(queue.acknowledge(ids)),
            _ => None,
        })?;
        let held = held.ok_or_else(|| MessagingError::SubscriptionLost {
            subscription: subscription.clone(),
        })?;
        self.acknowledge_messages(subscription, ids)?;
        Ok(held)
    }

    /// Return a topic subscriber's read-but-uncommitted messages to visible
    pub(crate) fn rollback_topic_delivery(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<usize> {
        let rolled_back = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(Subscription::Topic(topic)) => Some(topic.rollback()),
            _ => None,
        })?;
        let Some(rolled_back) = rolled_back else {
            return Ok(0);
        };
        self.messages
            .invoke_all(&Self::message_keys(subscription, &rolled_back), |_, entry| {
                if let Some(message) = entry {
                    message.rollback_delivery(subscription);
                }
            })?;
        log::debug!(
            "Rolled back {} messages for {}",
            rolled_back.size(),
            subscription
        );
        Ok(rolled_back.size())
    }

    /// Give queue messages held by `subscription` back to the queue for redelivery
    pub(crate) fn rollback_queue_messages(
        &self,
        subscription: &SubscriptionIdentifier,
        ids: &MessageTracker,
    ) -> MessagingResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let released = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(Subscription::Queue(queue)) => queue.release(ids),
            Some(Subscription::Topic(_)) => MessageTracker::new(),
            None => ids.clone(),
        })?;
        if released.is_empty() {
            return Ok(0);
        }

        self.messages
            .invoke_all(&Self::message_keys(subscription, &released), |_, entry| {
                if let Some(message) = entry {
                    message.revoke_visibility(subscription);
                }
            })?;
        let destination = subscription.destination();
        self.destinations.invoke(destination, |entry| {
            if let Some(Destination::Queue(queue)) = entry {
                queue.rollback_messages(subscription, &released);
            }
        })?;
        self.schedule_delivery(destination)?;
        Ok(released.size())
    }

    /// Roll back whatever the subscription holds but has not committed
    pub(crate) fn rollback_delivered(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<usize> {
        match self.subscriptions.get(subscription)? {
            Some(Subscription::Topic(_)) => self.rollback_topic_delivery(subscription),
            Some(Subscription::Queue(queue)) => {
                let held = queue.leased().visible_messages().clone();
                self.rollback_queue_messages(subscription, &held)
            }
            None => Ok(0),
        }
    }

    /// Extend the lease of a live subscription; false once it is gone
    pub(crate) fn renew_lease(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<bool> {
        let now = now_millis();
        Ok(self.subscriptions.invoke(subscription, |entry| match entry {
            Some(subscription) => {
                if !subscription.leased().lease().is_suspended() {
                    subscription.leased_mut().extend_lease(now);
                }
                true
            }
            None => false,
        })?)
    }

    /// Reattach to a subscription: resume its lease and enable it
    pub(crate) fn resume_subscription(
        &self,
        subscription: &SubscriptionIdentifier,
    ) -> MessagingResult<Option<Subscription>> {
        let now = now_millis();
        Ok(self.subscriptions.invoke(subscription, |entry| {
            entry.as_mut().map(|subscription| {
                subscription.leased_mut().resume_lease(now);
                subscription.leased_mut().enable();
                subscription.clone()
            })
        })?)
    }

    /// Park a durable subscription: its lease stops expiring and uncommitted
    /// messages roll back
    pub(crate) fn suspend_subscription(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<bool> {
        let found = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(subscription) => {
                subscription.leased_mut().suspend_lease();
                true
            }
            None => false,
        })?;
        if found {
            self.destinations.invoke(subscription.destination(), |entry| {
                if let Some(Destination::Queue(queue)) = entry {
                    queue.cancel_requests(subscription);
                }
            })?;
            self.rollback_delivered(subscription)?;
            log::debug!("Suspended durable subscription {}", subscription);
        }
        Ok(found)
    }

    /// Lease expired or was canceled
    pub(crate) fn handle_lease_loss(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<()> {
        match self.subscriptions.get(subscription)? {
            Some(entry) if entry.is_durable() => {
                self.suspend_subscription(subscription)?;
            }
            Some(_) => {
                self.unsubscribe(subscription)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Remove a subscription, settling every message it still holds
    ///
    /// Topic subscriptions acknowledge their outstanding messages so nothing
    /// waits on them; queue subscriptions hand theirs back for redelivery.
    pub(crate) fn unsubscribe(&self, subscription: &SubscriptionIdentifier) -> MessagingResult<bool> {
        let disabled = self.subscriptions.invoke(subscription, |entry| match entry {
            Some(subscription) => {
                subscription.leased_mut().disable();
                Some(subscription.clone())
            }
            None => None,
        })?;
        let Some(entry) = disabled else {
            return Ok(false);
        };
        self.deregister_lease(subscription)?;

        let destination = subscription.destination();
        self.destinations.invoke(destination, |entry| {
            if let Some(destination) = entry {
                destination.remove_subscription(subscription);
            }
        })?;

        match &entry {
            Subscription::Topic(_) => {
                let outstanding = entry.outstanding_messages();
                let deleted = self.acknowledge_messages(subscription, &outstanding)?;
                log::debug!(
                    "Unsubscribing {} acknowledged {} messages ({} deleted)",
                    subscription,
                    outstanding.size(),
                    deleted
                );
            }
            Subscription::Queue(queue) => {
                let held = queue.leased().visible_messages().clone();
                self.rollback_queue_messages(subscription, &held)?;
            }
        }

        self.subscriptions.remove(subscription)?;
        log::info!("Unsubscribed {}", subscription);
        Ok(true)
    }

    /// Delete a destination with all of its subscriptions and messages
    pub fn remove_destination(&self, destination: &Identifier) -> MessagingResult<bool> {
        let Some(entry) = self.destinations.get(destination)? else {
            return Ok(false);
        };

        for subscription in entry.subscriptions() {
            self.deregister_lease(subscription)?;
            self.subscriptions.remove(subscription)?;
        }

        let keys: Vec<MessageKey> = self
            .messages
            .keys()?
            .into_iter()
            .filter(|key| key.destination() == destination)
            .collect();
        self.messages.invoke_all(&keys, |_, entry| {
            *entry = None;
        })?;

        self.destinations.remove(destination)?;
        log::info!(
            "Removed destination {} ({} subscriptions, {} messages)",
            destination,
            entry.subscriptions().len(),
            keys.len()
        );
        Ok(true)
    }

    /// Hand a partition off: its entries leave every cache
    pub fn transfer_partition_out(&self, partition: PartitionId) -> MessagingResult<PartitionTransfer> {
        self.partition_service
            .fire(PartitionEventKind::DepartureBegin, partition)?;
        let transfer = PartitionTransfer {
            partition,
            destinations: self.destinations.depart_partition(partition)?,
            subscriptions: self.subscriptions.depart_partition(partition)?,
            messages: self.messages.depart_partition(partition)?,
        };
        self.partition_service
            .fire(PartitionEventKind::DepartureCommit, partition)?;
        log::info!(
            "Partition {} transferred out ({} entries)",
            partition,
            transfer.len()
        );
        Ok(transfer)
    }

    /// Install a partition's entries; arrival bookkeeping is not settled until
    /// [`MessagingContext::commit_partition_in`]
    pub fn begin_partition_in(&self, transfer: PartitionTransfer) -> MessagingResult<()> {
        let partition = transfer.partition;
        self.partition_service
            .fire(PartitionEventKind::ArrivalBegin, partition)?;
        self.destinations
            .arrive_partition(partition, transfer.destinations)?;
        self.subscriptions
            .arrive_partition(partition, transfer.subscriptions)?;
        self.messages.arrive_partition(partition, transfer.messages)?;
        Ok(())
    }

    pub fn commit_partition_in(&self, partition: PartitionId) -> MessagingResult<()> {
        self.partition_service
            .fire(PartitionEventKind::ArrivalCommit, partition)?;
        log::info!("Partition {} transferred in", partition);
        Ok(())
    }

    pub fn transfer_partition_in(&self, transfer: PartitionTransfer) -> MessagingResult<()> {
        let partition = transfer.partition;
        self.begin_partition_in(transfer)?;
        self.commit_partition_in(partition)
    }

    /// Undo a begun arrival, returning the entries so the transfer can be retried
    pub fn abort_partition_in(&self, partition: PartitionId) -> MessagingResult<PartitionTransfer> {
        let transfer = PartitionTransfer {
            partition,
            destinations: self.destinations.depart_partition(partition)?,
            subscriptions: self.subscriptions.depart_partition(partition)?,
            messages: self.messages.depart_partition(partition)?,
        };
        self.partition_service
            .fire(PartitionEventKind::ArrivalRollback, partition)?;
        log::warn!(
            "Partition {} arrival rolled back ({} entries)",
            partition,
            transfer.len()
        );
        Ok(transfer)
    }
}

impl Drop for MessagingContext {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(task) = sweeper.take() {
                task.abort();
            }
        }
    }
}
