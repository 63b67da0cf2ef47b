//! Batch exposure of pending messages to queues and topics

use crate::grid::api::GridError;
use crate::messaging::context::MessagingContext;
use crate::messaging::destination::{Destination, DestinationKind};
use crate::messaging::error::MessagingResult;
use crate::messaging::identifier::{Identifier, MessageKey, SubscriptionIdentifier};
use crate::messaging::subscription::Subscription;
use crate::messaging::tracker::MessageTracker;

fn message_keys(destination: &Identifier, tracker: &MessageTracker) -> Vec<MessageKey> {
    tracker
        .iter()
        .map(|id| MessageKey::new(destination.clone(), id))
        .collect()
}

/// One engine run: expose whatever is pending for `destination`
pub(crate) fn run_exposure(context: &MessagingContext, destination: &Identifier) -> MessagingResult<()> {
    let tracker = context.messages_to_expose().get_tracker_snapshot(destination)?;
    if tracker.is_empty() {
        return Ok(());
    }
    log::trace!("Exposing {} messages for {}", tracker.size(), destination);

    let kind = match context.destinations().get(destination) {
        Ok(Some(entry)) => entry.kind(),
        Ok(None) => {
            log::debug!(
                "Destination {} is gone; deleting {} unexposed messages",
                destination,
                tracker.size()
            );
            return delete_messages(context, &message_keys(destination, &tracker));
        }
        Err(GridError::PartitionNotOwned { .. }) => {
            // Picked up again when the destination arrives
            context.messages_to_expose().add_tracker(destination, &tracker)?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match kind {
        DestinationKind::Queue => expose_queue_message_batch(context, destination, &tracker),
        DestinationKind::Topic => expose_topic_message_batch(context, destination, &tracker),
    }
}

fn delete_messages(context: &MessagingContext, keys: &[MessageKey]) -> MessagingResult<()> {
    context.messages().invoke_all(keys, |_, entry| {
        *entry = None;
    })?;
    Ok(())
}

/// Hand a batch to a queue, mark the messages exposed and ask for delivery
pub(crate) fn expose_queue_message_batch(
    context: &MessagingContext,
    destination: &Identifier,
    tracker: &MessageTracker,
) -> MessagingResult<()> {
    let accepted = context.destinations().invoke(destination, |entry| match entry {
        Some(Destination::Queue(queue)) => Some(queue.on_accept_message(tracker)),
        _ => None,
    })?;
    let Some(accepted) = accepted else {
        return Ok(());
    };

    // Duplicates were accepted by an earlier run; they are exposed all the same
    context
        .messages()
        .invoke_all(&message_keys(destination, tracker), |_, entry| {
            if let Some(message) = entry {
                message.mark_exposed();
            }
        })?;

    log::debug!(
        "Queue {} accepted {} of {} messages",
        destination,
        accepted.size(),
        tracker.size()
    );
    context.schedule_delivery(destination)
}

/// Fan a batch out to every active subscription of a topic
///
/// Subscriptions accept first; only then is visibility stamped on the
/// messages, each one naming just the subscriptions that took it. With no
/// subscription to accept them the messages are deleted.
pub(crate) fn expose_topic_message_batch(
    context: &MessagingContext,
    destination: &Identifier,
    tracker: &MessageTracker,
) -> MessagingResult<()> {
    let subscriptions = context.destinations().invoke(destination, |entry| match entry {
        Some(Destination::Topic(topic)) => {
            topic.on_accept_message(tracker);
            Some(topic.subscriptions().clone())
        }
        _ => None,
    })?;
    let Some(subscriptions) = subscriptions else {
        return Ok(());
    };
    let keys = message_keys(destination, tracker);

    if subscriptions.is_empty() {
        log::debug!(
            "Topic {} has no subscriptions; deleting {} messages",
            destination,
            keys.len()
        );
        return delete_messages(context, &keys);
    }

    let mut active: Vec<(SubscriptionIdentifier, MessageTracker)> = Vec::new();
    for subscription in &subscriptions {
        let accepted = context.subscriptions().invoke(subscription, |entry| match entry {
            Some(Subscription::Topic(topic_subscription)) => {
                topic_subscription.on_accept_message(tracker)
            }
            _ => None,
        });
        match accepted {
            Ok(Some(taken)) => active.push((subscription.clone(), taken)),
            Ok(None) => log::trace!("Subscription {} declined exposure", subscription),
            Err(e) => log::warn!("Could not expose messages to {}: {}", subscription, e),
        }
    }

    if active.is_empty() {
        log::debug!(
            "Topic {} has no active subscriptions; deleting {} messages",
            destination,
            keys.len()
        );
        return delete_messages(context, &keys);
    }

    context.messages().invoke_all(&keys, |key, entry| {
        let Some(message) = entry else {
            return;
        };
        let id = key.message_id();
        let holders: Vec<SubscriptionIdentifier> = active
            .iter()
            .filter(|(_, taken)| taken.contains(id))
            .map(|(subscription, _)| subscription.clone())
            .collect();
        if holders.is_empty() && message.visible_to().is_empty() {
            log::debug!("No subscription took {}; deleting it", key);
            *entry = None;
        } else {
            message.make_visible_to(holders);
        }
    })?;

    context.destinations().invoke(destination, |entry| {
        if let Some(Destination::Topic(topic)) = entry {
            topic.record_exposure(active.iter().map(|(_, taken)| taken.size()).sum());
        }
    })?;

    for (subscription, _) in &active {
        context.notify_changed(subscription);
    }
    Ok(())
}

