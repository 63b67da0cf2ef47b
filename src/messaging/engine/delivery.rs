//! Queue delivery passes
//!
//! A pass plans assignments from a snapshot of the queue, applies each one
//! (subscription first, then the message), and writes the outcome back to
//! the queue in a separate invoke. Passes for one destination never overlap:
//! they run inside the task gated by the processor state manager.

use std::sync::Weak;

use crate::messaging::context::MessagingContext;
use crate::messaging::destination::{DeliveryOutcome, Destination};
use crate::messaging::error::MessagingResult;
use crate::messaging::identifier::{Identifier, MessageIdentifier, MessageKey, SubscriptionIdentifier};
use crate::messaging::subscription::Subscription;

/// Body of the background delivery task for one queue
pub(crate) async fn delivery_task(context: Weak<MessagingContext>, destination: Identifier) {
    loop {
        let Some(context) = context.upgrade() else {
            return;
        };
        match context.processor_states().start_running(&destination) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                log::warn!("Delivery gate for {} unavailable: {}", destination, e);
                return;
            }
        }

        if let Err(e) = deliver_queue_messages(&context, &destination) {
            log::warn!("Delivery pass for {} failed: {}", destination, e);
        }

        match context.processor_states().finish(&destination) {
            Ok(true) => continue,
            Ok(false) => return,
            Err(e) => {
                log::warn!("Delivery gate for {} unavailable: {}", destination, e);
                return;
            }
        }
    }
}

/// Run one delivery pass; returns the number of messages delivered
pub(crate) fn deliver_queue_messages(context: &MessagingContext, destination: &Identifier) -> MessagingResult<usize> {
    let Some(Destination::Queue(queue)) = context.destinations().get(destination)? else {
        return Ok(0);
    };
    let mut results = queue.do_delivery();
    if results.is_empty() {
        return Ok(0);
    }

    for delivery in results.deliveries_mut() {
        delivery.outcome = deliver_one(
            context,
            destination,
            &delivery.subscription,
            delivery.message_id,
        );
    }

    let delivered = context.destinations().invoke(destination, |entry| match entry {
        Some(Destination::Queue(queue)) => queue.process_delivery_results(&results),
        _ => 0,
    })?;

    for subscription in results.satisfied_subscriptions() {
        context.notify_changed(&subscription);
    }
    log::debug!(
        "Queue {} delivered {} of {} planned messages",
        destination,
        delivered,
        results.len()
    );
    Ok(delivered)
}

fn deliver_one(
    context: &MessagingContext,
    destination: &Identifier,
    subscription: &SubscriptionIdentifier,
    message_id: MessageIdentifier,
) -> DeliveryOutcome {
    let key = MessageKey::new(destination.clone(), message_id);
    match context.messages().contains_key(&key) {
        Ok(true) => {}
        Ok(false) => return DeliveryOutcome::Discarded,
        Err(e) => {
            log::warn!("Cannot deliver {}: {}", key, e);
            return DeliveryOutcome::Failed;
        }
    }

    let accepted = context.subscriptions().invoke(subscription, |entry| match entry {
        Some(Subscription::Queue(queue_subscription)) => queue_subscription.on_accept_message(message_id),
        _ => false,
    });
    match accepted {
        Ok(true) => {}
        Ok(false) => return DeliveryOutcome::Failed,
        Err(e) => {
            log::warn!("Delivery of {} to {} failed: {}", key, subscription, e);
            return DeliveryOutcome::Failed;
        }
    }

    let stamped = context.messages().invoke(&key, |entry| match entry {
        Some(message) => {
            message.make_visible_to_subscription(subscription.clone());
            true
        }
        None => false,
    });
    let outcome = match stamped {
        Ok(true) => return DeliveryOutcome::Delivered,
        Ok(false) => DeliveryOutcome::Discarded,
        Err(e) => {
            log::warn!("Could not mark {} visible to {}: {}", key, subscription, e);
            DeliveryOutcome::Failed
        }
    };

    let withdrawn = context.subscriptions().invoke(subscription, |entry| {
        if let Some(Subscription::Queue(queue_subscription)) = entry {
            queue_subscription.withdraw(message_id);
        }
    });
    if let Err(e) = withdrawn {
        log::warn!("Could not withdraw {} from {}: {}", key, subscription, e);
    }
    outcome
}
