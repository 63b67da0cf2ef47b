//! Client entry point: destinations, publishing and subscribing

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::core::time::now_millis;
use crate::grid::api::{hash_partition, Lease};
use crate::messaging::context::MessagingContext;
use crate::messaging::destination::{Destination, DestinationKind, DestinationStats};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::{
    Identifier, MessageIdentifier, PublishRequestIdentifier, SubscriptionIdentifier,
};
use crate::messaging::subscriber::{Subscriber, SubscriberConfig};
use crate::messaging::subscription::Subscription;

/// One publisher/subscriber client of a messaging context
///
/// Messages a session publishes to one destination are sequenced on a single
/// partition, so they are delivered in publish order.
pub struct MessagingSession {
    context: Arc<MessagingContext>,
    session_id: Identifier,
    request_counter: AtomicI64,
}

impl MessagingSession {
    pub fn new(context: Arc<MessagingContext>) -> Self {
        Self::with_id(context, Identifier::generate())
    }

    /// Session with a caller-chosen identity; publish requests are
    /// deduplicated per identity
    pub fn with_id(context: Arc<MessagingContext>, session_id: Identifier) -> Self {
        Self {
            context,
            session_id,
            request_counter: AtomicI64::new(0),
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.session_id
    }

    pub fn context(&self) -> &Arc<MessagingContext> {
        &self.context
    }

    pub fn create_topic(&self, name: impl Into<Identifier>) -> MessagingResult<Identifier> {
        self.create_destination(name.into(), DestinationKind::Topic)
    }

    pub fn create_queue(&self, name: impl Into<Identifier>) -> MessagingResult<Identifier> {
        self.create_destination(name.into(), DestinationKind::Queue)
    }

    /// Idempotent: an existing destination of the same kind is returned as is
    fn create_destination(&self, identifier: Identifier, kind: DestinationKind) -> MessagingResult<Identifier> {
        let existing = self.context.destinations().invoke(&identifier, |entry| match entry {
            Some(destination) => Some(destination.kind()),
            None => {
                *entry = Some(Destination::new(kind, identifier.clone()));
                None
            }
        })?;

        match existing {
            Some(actual) if actual != kind => Err(MessagingError::DestinationTypeMismatch {
                destination: identifier.to_string(),
                expected: kind,
                actual,
            }),
            Some(_) => Ok(identifier),
            None => {
                log::info!("Created {} {}", kind, identifier);
                Ok(identifier)
            }
        }
    }

    pub fn remove_destination(&self, destination: &Identifier) -> MessagingResult<bool> {
        self.context.remove_destination(destination)
    }

    pub fn destination_stats(&self, destination: &Identifier) -> MessagingResult<DestinationStats> {
        self.context.destination_stats(destination)
    }

    /// Publish one message; returns its identifier
    pub fn publish_message(
        &self,
        destination: &Identifier,
        payload: impl Into<Vec<u8>>,
    ) -> MessagingResult<Option<MessageIdentifier>> {
        let request_sequence = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let request_id = PublishRequestIdentifier::new(self.session_id.clone(), request_sequence);
        self.publish_with_request_id(destination, request_id, payload)
    }

    /// Publish under an explicit request identity
    ///
    /// Retrying with the same identity after an uncertain outcome is safe:
    /// the repeat is suppressed and `None` is returned.
    pub fn publish_with_request_id(
        &self,
        destination: &Identifier,
        request_id: PublishRequestIdentifier,
        payload: impl Into<Vec<u8>>,
    ) -> MessagingResult<Option<MessageIdentifier>> {
        let context = &self.context;
        if !context.destinations().contains_key(destination)? {
            return Err(MessagingError::DestinationNotFound {
                destination: destination.to_string(),
            });
        }

        let partition = hash_partition(
            &(request_id.publisher_id(), destination),
            context.config().partition_count,
        );
        let publisher = context.publishers().ensure_publisher(destination, partition)?;
        let published = publisher.publish_message(context.messages(), request_id, payload.into(), || {
            context.last_sequence_observed(destination, partition)
        })?;

        if let Some(message_id) = published {
            log::trace!("Published {} to {}", message_id, destination);
        }
        Ok(published)
    }

    /// Subscribe to a destination
    ///
    /// A named subscription that already exists is reattached instead of
    /// created.
    pub fn subscribe(&self, destination: &Identifier, config: SubscriberConfig) -> MessagingResult<Subscriber> {
        let context = &self.context;
        let kind = context.destination_kind(destination)?;
        let subscriber_id = config
            .name
            .clone()
            .map(Identifier::from)
            .unwrap_or_else(Identifier::generate);
        let subscription = SubscriptionIdentifier::new(destination.clone(), subscriber_id);

        // Listen before the entry exists so no update is missed
        let subscriber = Subscriber::attach(
            Arc::clone(context),
            subscription.clone(),
            kind,
            config.durable,
            config.auto_commit,
        )?;

        let lease = Lease::new(context.config().lease_duration(), now_millis());
        let entry = Subscription::new(kind, subscription.clone(), lease, config.durable);
        let created = context.subscriptions().invoke(&subscription, |slot| {
            if slot.is_none() {
                *slot = Some(entry);
                true
            } else {
                false
            }
        })?;
        if !created {
            context.resume_subscription(&subscription)?;
            log::debug!("Reattached to existing subscription {}", subscription);
        }

        let attached = context.destinations().invoke(destination, |slot| match slot {
            Some(destination) => {
                destination.add_subscription(subscription.clone());
                true
            }
            None => false,
        })?;
        if !attached {
            context.unsubscribe(&subscription)?;
            return Err(MessagingError::DestinationNotFound {
                destination: destination.to_string(),
            });
        }

        log::info!(
            "Subscribed {} ({}{})",
            subscription,
            kind,
            if config.durable { ", durable" } else { "" }
        );
        Ok(subscriber)
    }

    /// Reattach to a subscription created earlier, typically a released durable one
    pub fn subscribe_existing(
        &self,
        subscription: &SubscriptionIdentifier,
        config: SubscriberConfig,
    ) -> MessagingResult<Subscriber> {
        let context = &self.context;
        let Some(entry) = context.subscriptions().get(subscription)? else {
            return Err(MessagingError::SubscriptionNotFound {
                subscription: subscription.clone(),
            });
        };

        let subscriber = Subscriber::attach(
            Arc::clone(context),
            subscription.clone(),
            entry.kind(),
            entry.is_durable(),
            config.auto_commit,
        )?;
        if context.resume_subscription(subscription)?.is_none() {
            return Err(MessagingError::SubscriptionNotFound {
                subscription: subscription.clone(),
            });
        }
        log::info!("Resumed subscription {}", subscription);
        Ok(subscriber)
    }
}
