//! Tests for exposure runs, queue delivery and lease-driven cleanup

#[cfg(test)]
mod tests {
    use crate::messaging::api::{
        DestinationKind, EngineState, Identifier, MessageIdentifier, MessageTracker,
        MessagingContext, SubscriberConfig,
    };
    use crate::messaging::tests::support::{eventually, fast_config, session, session_on};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_accepts_published_messages() {
        let session = session();
        let queue = session.create_queue("jobs").unwrap();
        for n in 0..3 {
            session.publish_message(&queue, format!("job-{}", n)).unwrap();
        }

        assert!(
            eventually(|| session.destination_stats(&queue).unwrap().messages_received == 3).await
        );
        let stats = session.destination_stats(&queue).unwrap();
        assert_eq!(stats.kind, DestinationKind::Queue);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.messages_delivered, 0);

        let context = session.context();
        assert!(eventually(|| context
            .messages()
            .keys()
            .unwrap()
            .iter()
            .all(|key| context.messages().get(key).unwrap().is_some_and(|m| m.is_visible())))
        .await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_topic_without_subscriptions_deletes_messages() {
        let session = session();
        let topic = session.create_topic("T").unwrap();
        session.publish_message(&topic, "m1").unwrap();

        let context = Arc::clone(session.context());
        assert!(eventually(|| context.messages().is_empty().unwrap()).await);
        assert_eq!(session.destination_stats(&topic).unwrap().messages_received, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_topic_fans_out_and_deletes_after_all_commit() {
        let session = session();
        let topic = session.create_topic("prices").unwrap();
        let mut first = session.subscribe(&topic, SubscriberConfig::named("first")).unwrap();
        let mut second = session.subscribe(&topic, SubscriberConfig::named("second")).unwrap();

        session.publish_message(&topic, "tick").unwrap();

        let a = timeout(Duration::from_secs(5), first.get_message()).await.unwrap().unwrap();
        assert_eq!(a, b"tick");
        // One acknowledgement is not enough
        assert_eq!(session.context().messages().len().unwrap(), 1);

        let b = timeout(Duration::from_secs(5), second.get_message()).await.unwrap().unwrap();
        assert_eq!(b, b"tick");

        let context = Arc::clone(session.context());
        assert!(eventually(|| context.messages().is_empty().unwrap()).await);
        assert_eq!(session.destination_stats(&topic).unwrap().messages_delivered, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_delivers_each_message_once() {
        let session = session();
        let queue = session.create_queue("work").unwrap();
        let mut workers: Vec<_> = ["w1", "w2"]
            .iter()
            .map(|name| session.subscribe(&queue, SubscriberConfig::named(*name)).unwrap())
            .collect();

        for n in 0..6 {
            session.publish_message(&queue, format!("item-{}", n)).unwrap();
        }

        let mut received = Vec::new();
        while received.len() < 6 {
            for worker in workers.iter_mut() {
                if let Some(payload) = worker.try_get_message().unwrap() {
                    received.push(String::from_utf8(payload).unwrap());
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        received.sort();
        let expected: Vec<String> = (0..6).map(|n| format!("item-{}", n)).collect();
        assert_eq!(received, expected);

        let context = Arc::clone(session.context());
        assert!(eventually(|| context.messages().is_empty().unwrap()).await);
        assert_eq!(session.destination_stats(&queue).unwrap().messages_delivered, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_registry_lifecycle() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let queue = session.create_queue("lifecycle").unwrap();

        assert!(!context.engines().contains(&queue));
        session.publish_message(&queue, "x").unwrap();
        assert!(context.engines().contains(&queue));
        assert!(eventually(|| context.engines().state(&queue) == Some(EngineState::Idle)).await);

        assert!(session.remove_destination(&queue).unwrap());
        assert!(!context.engines().contains(&queue));
        assert!(context.messages().is_empty().unwrap());
        assert!(!context.destinations().contains_key(&queue).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_on_unknown_destination_deletes_orphans() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let queue = session.create_queue("short-lived").unwrap();
        session.publish_message(&queue, "orphan").unwrap();
        context.destinations().remove(&queue).unwrap();

        // A late trigger finds no destination and cleans up after it
        let leftovers: MessageTracker = context
            .messages()
            .keys()
            .unwrap()
            .iter()
            .map(|key| key.message_id())
            .collect();
        context.messages_to_expose().add_tracker(&queue, &leftovers).unwrap();
        context.engines().submit(&queue).unwrap();
        assert!(eventually(|| context.messages().is_empty().unwrap()).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_expired_lease_removes_non_durable_subscription() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let topic = session.create_topic("ephemeral").unwrap();
        let subscriber = session.subscribe(&topic, SubscriberConfig::named("gone")).unwrap();
        let subscription = subscriber.subscription().clone();

        // Dropping the subscriber stops lease renewal
        drop(subscriber);
        assert!(eventually(|| !context.subscriptions().contains_key(&subscription).unwrap()).await);
        let stats = session.destination_stats(&topic).unwrap();
        assert_eq!(stats.subscriptions, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_expired_lease_suspends_durable_subscription() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let topic = session.create_topic("archive").unwrap();
        let subscriber = session
            .subscribe(&topic, SubscriberConfig::named("keeper").durable(true))
            .unwrap();
        let subscription = subscriber.subscription().clone();
        drop(subscriber);

        assert!(eventually(|| context
            .subscriptions()
            .get(&subscription)
            .unwrap()
            .is_some_and(|s| s.leased().lease().is_suspended()))
        .await);

        // Still collecting messages while parked
        session.publish_message(&topic, "kept").unwrap();
        assert!(eventually(|| context
            .subscriptions()
            .get(&subscription)
            .unwrap()
            .is_some_and(|s| s.leased().visible_messages().size() == 1))
        .await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_renewed_lease_keeps_subscription_alive() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let topic = session.create_topic("alive").unwrap();
        let subscriber = session.subscribe(&topic, SubscriberConfig::default()).unwrap();

        // Several lease durations
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(context
            .subscriptions()
            .contains_key(subscriber.subscription())
            .unwrap());
        assert_eq!(
            session.destination_stats(&topic).unwrap().subscriptions,
            1
        );
    }

    #[tokio::test]
    async fn test_submits_while_a_run_is_queued_coalesce() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let destination = Identifier::from("busy");

        // The current-thread runtime cannot start the engine task until we yield
        let accepted = (0..10)
            .filter(|_| context.engines().submit(&destination).unwrap())
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(context.engines().state(&destination), Some(EngineState::Idle));
        assert_eq!(context.engines().len(), 1);

        // Once the queued run is picked up a new trigger is accepted again
        assert!(eventually(|| context.engines().submit(&destination).unwrap()).await);
        assert!(!context.engines().submit(&destination).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_topic_message_names_only_subscriptions_that_took_it() {
        let context = MessagingContext::new(fast_config()).unwrap();
        let session = session_on(&context);
        let topic = session.create_topic("quotes").unwrap();
        let lagging = session.subscribe(&topic, SubscriberConfig::named("behind")).unwrap();
        let mut reader = session
            .subscribe(&topic, SubscriberConfig::named("reader").auto_commit(false))
            .unwrap();

        // Pretend "behind" already saw far later sequences on every partition
        let behind = lagging.subscription().clone();
        context
            .subscriptions()
            .invoke(&behind, |entry| {
                let subscription = entry.as_mut().unwrap();
                for partition in 0..fast_config().partition_count as i32 {
                    subscription
                        .leased_mut()
                        .accept_one(MessageIdentifier::new(partition, 100));
                }
            })
            .unwrap();

        session.publish_message(&topic, "bid").unwrap();
        let payload = timeout(Duration::from_secs(5), reader.get_message()).await.unwrap().unwrap();
        assert_eq!(payload, b"bid");

        let keys = context.messages().keys().unwrap();
        assert_eq!(keys.len(), 1);
        let message = context.messages().get(&keys[0]).unwrap().unwrap();
        assert!(message.visible_to().contains(reader.subscription()));
        assert!(!message.visible_to().contains(&behind));

        assert_eq!(reader.commit().unwrap(), 1);
        assert!(eventually(|| context.messages().is_empty().unwrap()).await);
    }
}
