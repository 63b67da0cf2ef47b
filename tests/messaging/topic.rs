//! Fan-out delivery through topics

use crate::common;
use gridmq::messaging::api::{MessagingError, SubscriberConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_subscriber_sees_every_message_in_order() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("prices").unwrap();

    let mut alpha = session.subscribe(&topic, SubscriberConfig::named("alpha")).unwrap();
    let mut beta = session.subscribe(&topic, SubscriberConfig::named("beta")).unwrap();
    for n in 1..=5 {
        session.publish_message(&topic, format!("tick {}", n)).unwrap();
    }

    for subscriber in [&mut alpha, &mut beta] {
        for n in 1..=5 {
            assert_eq!(common::next_text(subscriber).await, format!("tick {}", n));
        }
        subscriber.commit().unwrap();
    }

    assert!(
        common::eventually(|| context.messages().is_empty().unwrap()).await,
        "messages acknowledged by every subscriber should be deleted"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_without_subscribers_is_dropped() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("nobody-listens").unwrap();

    session.publish_message(&topic, "lost").unwrap();

    assert!(common::eventually(|| context.messages().is_empty().unwrap()).await);
    let stats = session.destination_stats(&topic).unwrap();
    assert_eq!(stats.messages_received, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rollback_makes_messages_readable_again() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("audit").unwrap();

    let mut reader = session
        .subscribe(&topic, SubscriberConfig::named("auditor").auto_commit(false))
        .unwrap();
    session.publish_message(&topic, "first").unwrap();
    session.publish_message(&topic, "second").unwrap();

    assert_eq!(common::next_text(&mut reader).await, "first");
    assert_eq!(common::next_text(&mut reader).await, "second");
    assert_eq!(reader.rollback().unwrap(), 2);

    assert_eq!(common::next_text(&mut reader).await, "first");
    assert_eq!(common::next_text(&mut reader).await, "second");
    assert_eq!(reader.commit().unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_durable_subscription_collects_while_released() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("orders").unwrap();

    let mut subscriber = session
        .subscribe(&topic, SubscriberConfig::named("ledger").durable(true))
        .unwrap();
    let subscription = subscriber.subscription().clone();
    subscriber.release().unwrap();
    drop(subscriber);

    session.publish_message(&topic, "while away").unwrap();

    let mut resumed = session
        .subscribe_existing(&subscription, SubscriberConfig::default())
        .unwrap();
    assert_eq!(common::next_text(&mut resumed).await, "while away");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removing_the_destination_loses_the_subscription() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("temporary").unwrap();

    let mut subscriber = session.subscribe(&topic, SubscriberConfig::default()).unwrap();
    assert!(session.remove_destination(&topic).unwrap());

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.get_message())
        .await
        .expect("subscriber should notice the removal");
    assert!(matches!(outcome, Err(MessagingError::SubscriptionLost { .. })));
}
