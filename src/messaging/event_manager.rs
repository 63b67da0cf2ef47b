//! Reactions to cache, partition and lease events
//!
//! The event manager is registered on all three caches, on the partition
//! service and with the lease coordinator. It turns raw storage events into
//! exposure work, publisher bookkeeping and subscriber notifications.

use std::sync::Weak;

use crate::grid::api::{
    CacheEvent, CacheListener, EntryEventKind, Lease, LeaseListener, PartitionEvent,
    PartitionEventKind, PartitionId, PartitionListener,
};
use crate::messaging::context::MessagingContext;
use crate::messaging::destination::Destination;
use crate::messaging::error::MessagingResult;
use crate::messaging::identifier::{Identifier, MessageKey, SubscriptionIdentifier};
use crate::messaging::message::Message;
use crate::messaging::subscription::Subscription;
use crate::notifications::api::SubscriptionUpdateKind;

pub struct MessageEventManager {
    context: Weak<MessagingContext>,
}

impl MessageEventManager {
    pub(crate) fn new(context: Weak<MessagingContext>) -> Self {
        Self { context }
    }

    fn with_context(&self, operation: &str, f: impl FnOnce(&MessagingContext) -> MessagingResult<()>) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if let Err(e) = f(&context) {
            log::warn!("{} failed: {}", operation, e);
        }
    }

    fn on_message_event(context: &MessagingContext, event: &CacheEvent<MessageKey, Message>) -> MessagingResult<()> {
        let destination = event.key.destination();
        let message_id = event.key.message_id();
        match event.kind {
            EntryEventKind::Inserted => {
                if event.new_value.as_ref().is_some_and(|m| !m.is_visible()) {
                    context.messages_to_expose().add(destination, message_id)?;
                    context.engines().submit(destination)?;
                }
            }
            EntryEventKind::Arrived => {
                let Some(message) = event.value() else {
                    return Ok(());
                };
                context
                    .publishers()
                    .ensure_publisher(destination, event.partition)?
                    .save_arriving_message(message_id, message.request_id(), message.is_visible())?;
            }
            EntryEventKind::Updated | EntryEventKind::Removed | EntryEventKind::Departed => {}
        }
        Ok(())
    }

    fn on_destination_event(
        context: &MessagingContext,
        event: &CacheEvent<Identifier, Destination>,
    ) -> MessagingResult<()> {
        let destination = &event.key;
        match event.kind {
            EntryEventKind::Removed => {
                context.engines().dispose(destination)?;
                context.messages_to_expose().remove_destination(destination)?;
                context.processor_states().remove(destination)?;
                let evicted = context.publishers().remove_destination(destination)?;
                log::debug!(
                    "Destination {} removed; evicted {} publishers",
                    destination,
                    evicted
                );
            }
            EntryEventKind::Departed => {
                context.engines().dispose(destination)?;
            }
            EntryEventKind::Arrived => {
                context.engines().submit(destination)?;
                if matches!(event.value(), Some(Destination::Queue(_))) {
                    context.schedule_delivery(destination)?;
                }
            }
            EntryEventKind::Inserted | EntryEventKind::Updated => {}
        }
        Ok(())
    }

    fn on_subscription_event(
        context: &MessagingContext,
        event: &CacheEvent<SubscriptionIdentifier, Subscription>,
    ) -> MessagingResult<()> {
        let subscription = &event.key;
        match event.kind {
            EntryEventKind::Inserted | EntryEventKind::Updated | EntryEventKind::Arrived => {
                if let Some(value) = &event.new_value {
                    context.register_lease(subscription, value.leased().lease().clone())?;
                }
                context.notify(subscription, SubscriptionUpdateKind::Changed);
            }
            EntryEventKind::Removed => {
                context.deregister_lease(subscription)?;
                context.notify(subscription, SubscriptionUpdateKind::Removed);
            }
            EntryEventKind::Departed => {
                context.deregister_lease(subscription)?;
            }
        }
        Ok(())
    }

    fn on_partition_committed(context: &MessagingContext, kind: PartitionEventKind, partition: PartitionId) -> MessagingResult<()> {
        match kind {
            PartitionEventKind::DepartureCommit => {
                let evicted = context.publishers().remove_partition(partition)?;
                for publisher in &evicted {
                    context
                        .messages_to_expose()
                        .clear_partition(publisher.destination(), partition)?;
                }
                log::debug!(
                    "Partition {} departed; evicted {} publishers",
                    partition,
                    evicted.len()
                );
            }
            PartitionEventKind::ArrivalCommit => {
                for publisher in context.publishers().publishers_for_partition(partition)? {
                    publisher.recreate_ticket_book()?;
                    context.messages_to_expose().create_range_for_partition(
                        publisher.destination(),
                        partition,
                        publisher.arriving_unexposed()?,
                    )?;
                    publisher.reset()?;
                    context.engines().submit(publisher.destination())?;
                }
            }
            PartitionEventKind::ArrivalRollback => {
                for publisher in context.publishers().remove_partition(partition)? {
                    publisher.reset()?;
                }
            }
            PartitionEventKind::ArrivalBegin
            | PartitionEventKind::DepartureBegin
            | PartitionEventKind::DepartureRollback => {
                log::trace!("Partition {}: {}", partition, kind);
            }
        }
        Ok(())
    }
}

impl CacheListener<MessageKey, Message> for MessageEventManager {
    fn on_event(&self, event: &CacheEvent<MessageKey, Message>) {
        self.with_context("Message event handling", |context| {
            Self::on_message_event(context, event)
        });
    }
}

impl CacheListener<Identifier, Destination> for MessageEventManager {
    fn on_event(&self, event: &CacheEvent<Identifier, Destination>) {
        self.with_context("Destination event handling", |context| {
            Self::on_destination_event(context, event)
        });
    }
}

impl CacheListener<SubscriptionIdentifier, Subscription> for MessageEventManager {
    fn on_event(&self, event: &CacheEvent<SubscriptionIdentifier, Subscription>) {
        self.with_context("Subscription event handling", |context| {
            Self::on_subscription_event(context, event)
        });
    }
}

impl PartitionListener for MessageEventManager {
    fn on_partition_event(&self, event: &PartitionEvent) {
        self.with_context("Partition event handling", |context| {
            Self::on_partition_committed(context, event.kind, event.partition)
        });
    }
}

impl LeaseListener<SubscriptionIdentifier> for MessageEventManager {
    fn on_lease_expiry(&self, id: &SubscriptionIdentifier, lease: &Lease) {
        log::info!("Lease for subscription {} expired at {}", id, lease.expiry());
        self.with_context("Lease expiry handling", |context| context.handle_lease_loss(id));
    }

    fn on_lease_canceled(&self, id: &SubscriptionIdentifier, _lease: &Lease) {
        log::info!("Lease for subscription {} canceled", id);
        self.with_context("Lease cancel handling", |context| context.handle_lease_loss(id));
    }

    fn on_lease_suspended(&self, id: &SubscriptionIdentifier, _lease: &Lease) {
        log::debug!("Lease for subscription {} suspended", id);
        self.with_context("Lease suspend handling", |context| {
            context.rollback_delivered(id).map(|_| ())
        });
    }
}
