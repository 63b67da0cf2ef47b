//! Partition hand-off and recovery of publisher and exposure state

use crate::common;
use gridmq::grid::api::hash_partition;
use gridmq::messaging::api::{
    Identifier, Message, MessageIdentifier, MessageKey, PartitionTransfer,
    PublishRequestIdentifier, SubscriberConfig,
};

const PARTITION: i32 = 3;

/// Messages of one publisher partition: `(sequence, already exposed)`
fn arriving_messages(destination: &Identifier, layout: &[(i64, bool)]) -> PartitionTransfer {
    let publisher = Identifier::from("remote-publisher");
    let messages = layout
        .iter()
        .map(|&(sequence, exposed)| {
            let key = MessageKey::new(destination.clone(), MessageIdentifier::new(PARTITION, sequence));
            let request = PublishRequestIdentifier::new(publisher.clone(), sequence);
            let mut message = Message::new(key.clone(), sequence.to_string().into_bytes(), request);
            if exposed {
                message.make_visible_to(std::iter::empty());
            }
            (key, message)
        })
        .collect();
    PartitionTransfer {
        partition: PARTITION,
        messages,
        ..PartitionTransfer::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arrival_resumes_sequence_and_exposes_the_rest() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("arrivals").unwrap();
    let mut reader = session.subscribe(&topic, SubscriberConfig::named("reader")).unwrap();

    let layout = [(17, false), (4, true), (12, false), (9, true), (15, false)];
    context
        .transfer_partition_in(arriving_messages(&topic, &layout))
        .unwrap();

    let publisher = context
        .publishers()
        .publisher(&topic, PARTITION)
        .unwrap()
        .expect("publisher recreated on arrival");
    assert_eq!(publisher.next_sequence().unwrap(), Some(18));

    // Only the unexposed arrivals reach the subscriber, in sequence order
    for expected in ["12", "15", "17"] {
        assert_eq!(common::next_text(&mut reader).await, expected);
    }
    assert!(reader.try_get_message().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_arrival_leaves_nothing_behind() {
    let context = common::context();
    let session = common::session(&context);
    let topic = session.create_topic("aborted").unwrap();

    let transfer = arriving_messages(&topic, &[(1, false), (2, true)]);
    context.begin_partition_in(transfer).unwrap();
    assert_eq!(context.messages().len().unwrap(), 2);

    let returned = context.abort_partition_in(PARTITION).unwrap();
    assert_eq!(returned.messages.len(), 2);
    assert!(context.messages().is_empty().unwrap());
    assert!(context.publishers().publisher(&topic, PARTITION).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_trip_transfer_keeps_queue_work() {
    let context = common::context();
    let session = common::session(&context);
    let queue = session.create_queue("handoff").unwrap();

    session.publish_message(&queue, "before").unwrap();
    let partition = hash_partition(&(session.id(), &queue), context.config().partition_count);
    let transfer = context.transfer_partition_out(partition).unwrap();
    assert!(!transfer.messages.is_empty());
    assert!(context.publishers().publisher(&queue, partition).unwrap().is_none());

    context.transfer_partition_in(transfer).unwrap();
    let next = session.publish_message(&queue, "after").unwrap().unwrap();
    assert_eq!(next.partition_id(), partition);
    assert_eq!(next.sequence_number(), 2);

    let mut worker = session.subscribe(&queue, SubscriberConfig::named("worker")).unwrap();
    assert_eq!(common::next_text(&mut worker).await, "before");
    assert_eq!(common::next_text(&mut worker).await, "after");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retried_publish_after_round_trip_is_suppressed() {
    let context = common::context();
    let session = common::session(&context);
    let queue = session.create_queue("retry-after-move").unwrap();
    let request = PublishRequestIdentifier::new(session.id().clone(), 7);

    let first = session
        .publish_with_request_id(&queue, request.clone(), "once")
        .unwrap()
        .expect("first publish stored");
    let transfer = context.transfer_partition_out(first.partition_id()).unwrap();
    context.transfer_partition_in(transfer).unwrap();

    let retried = session
        .publish_with_request_id(&queue, request, "once")
        .unwrap();
    assert!(retried.is_none());
    assert_eq!(context.messages().len().unwrap(), 1);
}
