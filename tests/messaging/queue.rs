//! Point-to-point delivery through queues

use std::collections::BTreeSet;

use crate::common;
use gridmq::messaging::api::{
    DeliveryOutcome, Identifier, MessageIdentifier, MessageTracker, Queue, SubscriberConfig,
    SubscriptionIdentifier,
};

#[test]
fn test_two_waiting_subscribers_alternate() {
    let queue_id = Identifier::from("work");
    let first = SubscriptionIdentifier::new(queue_id.clone(), Identifier::from("S1"));
    let second = SubscriptionIdentifier::new(queue_id.clone(), Identifier::from("S2"));

    let mut queue = Queue::new(queue_id);
    queue.add_subscription(first.clone());
    queue.add_subscription(second.clone());
    let batch: MessageTracker = (1..=4).map(|n| MessageIdentifier::new(0, n)).collect();
    queue.on_accept_message(&batch);
    queue.request_message(first.clone());
    queue.request_message(second.clone());

    let mut results = queue.do_delivery();
    let sequences = |subscription| -> Vec<i64> {
        results
            .messages_for(subscription)
            .iter()
            .map(|id| id.sequence_number())
            .collect()
    };
    assert_eq!(sequences(&first), vec![1, 3]);
    assert_eq!(sequences(&second), vec![2, 4]);

    results.mark_all(DeliveryOutcome::Delivered);
    assert_eq!(queue.process_delivery_results(&results), 4);
    assert_eq!(queue.num_messages_delivered(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_each_message_reaches_exactly_one_worker() {
    let context = common::context();
    let session = common::session(&context);
    let queue = session.create_queue("jobs").unwrap();

    let mut first = session.subscribe(&queue, SubscriberConfig::named("w1")).unwrap();
    let mut second = session.subscribe(&queue, SubscriberConfig::named("w2")).unwrap();
    for n in 1..=6 {
        session.publish_message(&queue, format!("job {}", n)).unwrap();
    }

    let mut seen = BTreeSet::new();
    while seen.len() < 6 {
        for worker in [&mut first, &mut second] {
            if let Some(payload) = worker.try_get_message().unwrap() {
                assert!(seen.insert(payload), "message delivered twice");
                worker.commit().unwrap();
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(
        common::eventually(|| context.messages().is_empty().unwrap()).await,
        "committed queue messages should be deleted"
    );
    let stats = session.destination_stats(&queue).unwrap();
    assert_eq!(stats.messages_received, 6);
    assert_eq!(stats.messages_delivered, 6);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rolled_back_message_goes_to_the_other_worker() {
    let context = common::context();
    let session = common::session(&context);
    let queue = session.create_queue("jobs").unwrap();

    let mut first = session
        .subscribe(&queue, SubscriberConfig::named("w1").auto_commit(false))
        .unwrap();
    session.publish_message(&queue, "only job").unwrap();
    assert_eq!(common::next_text(&mut first).await, "only job");

    let mut second = session
        .subscribe(&queue, SubscriberConfig::named("w2").auto_commit(false))
        .unwrap();
    first.unsubscribe().unwrap();

    assert_eq!(common::next_text(&mut second).await, "only job");
    assert_eq!(second.commit().unwrap(), 1);
}
