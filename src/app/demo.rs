//! Demo walk-through driven by the binary
//!
//! Creates one topic and one queue, fans messages out to topic listeners,
//! lets queue workers compete for the queue's messages and, optionally,
//! moves the publishing partition out of the grid and back in half way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::config::MessagingConfig;
use crate::grid::api::hash_partition;
use crate::messaging::api::{
    DestinationStats, MessagingContext, MessagingError, MessagingResult, MessagingSession,
    Subscriber, SubscriberConfig,
};

pub const TOPIC_NAME: &str = "demo.events";
pub const QUEUE_NAME: &str = "demo.work";

/// Shape of one demo run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoPlan {
    pub messages: usize,
    pub topic_subscribers: usize,
    pub queue_workers: usize,
    pub transfer: bool,
    /// Give up on a reader after this long without a message
    pub idle_timeout: Duration,
}

impl Default for DemoPlan {
    fn default() -> Self {
        Self {
            messages: 8,
            topic_subscribers: 2,
            queue_workers: 2,
            transfer: false,
            idle_timeout: Duration::from_secs(2),
        }
    }
}

/// Messages one subscriber received
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReaderTally {
    pub subscriber: String,
    pub destination: String,
    pub received: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    pub destinations: Vec<DestinationStats>,
    pub readers: Vec<ReaderTally>,
    /// Entries moved when the partition transfer ran
    pub transferred_entries: Option<usize>,
}

impl DemoReport {
    pub fn received_from(&self, destination: &str) -> usize {
        self.readers
            .iter()
            .filter(|tally| tally.destination == destination)
            .map(|tally| tally.received)
            .sum()
    }
}

/// Run the demo against a fresh context; must be called inside a tokio runtime
pub async fn run(config: MessagingConfig, plan: &DemoPlan) -> MessagingResult<DemoReport> {
    let context = MessagingContext::new(config)?;
    let outcome = run_with_context(&context, plan).await;
    context.shutdown()?;
    outcome
}

pub async fn run_with_context(context: &Arc<MessagingContext>, plan: &DemoPlan) -> MessagingResult<DemoReport> {
    let session = MessagingSession::new(Arc::clone(context));
    let topic = session.create_topic(TOPIC_NAME)?;
    let queue = session.create_queue(QUEUE_NAME)?;

    let mut listeners = Vec::with_capacity(plan.topic_subscribers);
    for index in 0..plan.topic_subscribers {
        let name = format!("listener-{}", index + 1);
        let config = SubscriberConfig::named(name.clone()).auto_commit(false);
        listeners.push((name, session.subscribe(&topic, config)?));
    }
    let mut workers = Vec::with_capacity(plan.queue_workers);
    for index in 0..plan.queue_workers {
        let name = format!("worker-{}", index + 1);
        let config = SubscriberConfig::named(name.clone()).auto_commit(false);
        workers.push((name, session.subscribe(&queue, config)?));
    }

    let first_half = plan.messages / 2;
    for sequence in 0..first_half {
        publish_pair(&session, sequence)?;
    }

    let transferred_entries = if plan.transfer {
        let partition = hash_partition(&(session.id(), &queue), context.config().partition_count);
        let transfer = context.transfer_partition_out(partition)?;
        let moved = transfer.len();
        log::info!("Moving partition {} ({} entries) back in", partition, moved);
        context.transfer_partition_in(transfer)?;
        Some(moved)
    } else {
        None
    };

    for sequence in first_half..plan.messages {
        publish_pair(&session, sequence)?;
    }

    let mut tasks = Vec::new();
    for (name, subscriber) in listeners {
        let expected = plan.messages;
        let idle = plan.idle_timeout;
        tasks.push(tokio::spawn(async move {
            drain(name, subscriber, idle, |received| received >= expected, None).await
        }));
    }
    let claimed = Arc::new(AtomicUsize::new(0));
    for (name, subscriber) in workers {
        let expected = plan.messages;
        let idle = plan.idle_timeout;
        let claimed = Arc::clone(&claimed);
        tasks.push(tokio::spawn(async move {
            let done = {
                let claimed = Arc::clone(&claimed);
                move |_: usize| claimed.load(Ordering::SeqCst) >= expected
            };
            drain(name, subscriber, idle, done, Some(claimed)).await
        }));
    }

    let mut readers = Vec::with_capacity(tasks.len());
    for task in tasks {
        let tally = task.await.map_err(|e| MessagingError::Runtime {
            message: format!("reader task failed: {}", e),
        })??;
        readers.push(tally);
    }

    let destinations = vec![
        session.destination_stats(&topic)?,
        session.destination_stats(&queue)?,
    ];
    Ok(DemoReport {
        destinations,
        readers,
        transferred_entries,
    })
}

fn publish_pair(session: &MessagingSession, sequence: usize) -> MessagingResult<()> {
    let payload = format!("message {}", sequence + 1);
    for name in [TOPIC_NAME, QUEUE_NAME] {
        session.publish_message(&name.into(), payload.as_bytes())?;
    }
    Ok(())
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read and commit until `done` says so or nothing arrives within `idle`
async fn drain(
    name: String,
    mut subscriber: Subscriber,
    idle: Duration,
    done: impl Fn(usize) -> bool,
    shared: Option<Arc<AtomicUsize>>,
) -> MessagingResult<ReaderTally> {
    let destination = subscriber.subscription().destination().to_string();
    let mut received = 0;
    let mut waited = Duration::ZERO;
    while !done(received) && waited < idle {
        let polled = tokio::time::timeout(POLL_INTERVAL, subscriber.get_message()).await;
        match polled {
            Ok(Ok(payload)) => {
                received += 1;
                waited = Duration::ZERO;
                if let Some(counter) = &shared {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                log::debug!("{} got '{}'", name, String::from_utf8_lossy(&payload));
                subscriber.commit()?;
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => waited += POLL_INTERVAL,
        }
    }
    if !done(received) {
        log::warn!("{} gave up after {} messages", name, received);
    }
    subscriber.unsubscribe()?;
    Ok(ReaderTally {
        subscriber: name,
        destination,
        received,
    })
}
