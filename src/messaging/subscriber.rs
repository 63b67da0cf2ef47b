//! Client-side handle on one subscription
//!
//! A subscriber reads messages made visible to its subscription, commits or
//! rolls them back, and keeps the subscription's lease alive from a
//! background task for as long as it is attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::messaging::context::{MessagingContext, ReadOutcome};
use crate::messaging::destination::{Destination, DestinationKind};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::{Identifier, MessageIdentifier, MessageKey, SubscriptionIdentifier};
use crate::messaging::subscription::Subscription;
use crate::messaging::tracker::MessageTracker;
use crate::notifications::api::{SubscriptionUpdate, SubscriptionUpdateKind, UpdateFilter, UpdateReceiver};

/// Options for [`crate::messaging::api::MessagingSession::subscribe`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Subscription name; a random one is generated when absent
    pub name: Option<String>,
    /// Durable subscriptions survive their subscriber and lease expiry
    pub durable: bool,
    /// Commit every message as soon as it is read
    pub auto_commit: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            name: None,
            durable: false,
            auto_commit: true,
        }
    }
}

impl SubscriberConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum SubscriberState {
    Active,
    Released,
    Unsubscribed,
    Lost,
    Interrupted,
}

/// Wakes a subscriber blocked in [`Subscriber::get_message`] from another task
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle {
    notify: Arc<Notify>,
    interrupted: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}

enum Wake {
    Update(Option<SubscriptionUpdate>),
    Interrupt,
    Idle,
}

/// Background lease renewal; stops cooperatively between sleeps
struct LeaseMaintainer {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LeaseMaintainer {
    fn start(context: &MessagingContext, subscription: SubscriptionIdentifier) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let weak = context.weak();
        let interval = context.config().lease_renew_interval();
        let flag = Arc::clone(&running);

        let task = context.runtime().spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                let Some(context) = weak.upgrade() else {
                    break;
                };
                match context.renew_lease(&subscription) {
                    Ok(true) => log::trace!("Renewed lease for {}", subscription),
                    Ok(false) => {
                        log::debug!("Subscription {} is gone; lease renewal stopped", subscription);
                        break;
                    }
                    Err(e) => log::warn!("Lease renewal for {} failed: {}", subscription, e),
                }
            }
        });

        Self { running, task }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.task.abort();
    }
}

pub struct Subscriber {
    context: Arc<MessagingContext>,
    subscription: SubscriptionIdentifier,
    kind: DestinationKind,
    durable: bool,
    auto_commit: bool,
    state: SubscriberState,
    receiver_id: String,
    updates: UpdateReceiver,
    /// Queue messages handed to the caller but not yet committed
    read_uncommitted: MessageTracker,
    requested: bool,
    interrupt: InterruptHandle,
    lease_maintainer: LeaseMaintainer,
}

impl Subscriber {
    pub(crate) fn attach(
        context: Arc<MessagingContext>,
        subscription: SubscriptionIdentifier,
        kind: DestinationKind,
        durable: bool,
        auto_commit: bool,
    ) -> MessagingResult<Self> {
        let receiver_id = format!("{}#{}", subscription, Uuid::new_v4());
        let updates = context.notifier().subscribe(
            receiver_id.clone(),
            UpdateFilter::Subscription(subscription.clone()),
            "subscriber".to_string(),
        )?;
        let lease_maintainer = LeaseMaintainer::start(&context, subscription.clone());

        Ok(Self {
            context,
            subscription,
            kind,
            durable,
            auto_commit,
            state: SubscriberState::Active,
            receiver_id,
            updates,
            read_uncommitted: MessageTracker::new(),
            requested: false,
            interrupt: InterruptHandle::default(),
            lease_maintainer,
        })
    }

    pub fn subscription(&self) -> &SubscriptionIdentifier {
        &self.subscription
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn set_auto_commit(&mut self, auto_commit: bool) {
        self.auto_commit = auto_commit;
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn lost(&self) -> MessagingError {
        MessagingError::SubscriptionLost {
            subscription: self.subscription.clone(),
        }
    }

    fn ensure_active(&mut self) -> MessagingResult<()> {
        if self.state != SubscriberState::Active {
            return Err(self.lost());
        }
        if self.interrupt.is_interrupted() {
            self.state = SubscriberState::Interrupted;
            self.lease_maintainer.stop();
            return Err(MessagingError::SubscriberInterrupted {
                subscription: self.subscription.clone(),
            });
        }
        Ok(())
    }

    fn handle_update(&mut self, update: &SubscriptionUpdate) -> MessagingResult<()> {
        if update.kind == SubscriptionUpdateKind::Removed {
            log::debug!("Subscription {} was removed", self.subscription);
            self.state = SubscriberState::Lost;
            self.lease_maintainer.stop();
            return Err(self.lost());
        }
        Ok(())
    }

    fn drain_updates(&mut self) -> MessagingResult<()> {
        while let Some(update) = self.updates.try_recv() {
            self.handle_update(&update)?;
        }
        Ok(())
    }

    fn current_entry(&mut self) -> MessagingResult<Subscription> {
        match self.context.subscriptions().get(&self.subscription)? {
            Some(entry) => Ok(entry),
            None => {
                self.state = SubscriberState::Lost;
                self.lease_maintainer.stop();
                Err(self.lost())
            }
        }
    }

    /// Read the next available message without waiting
    pub fn try_get_message(&mut self) -> MessagingResult<Option<Vec<u8>>> {
        self.ensure_active()?;
        self.drain_updates()?;
        match self.kind {
            DestinationKind::Topic => self.read_topic(),
            DestinationKind::Queue => self.read_queue(),
        }
    }

    /// Wait for the next message
    ///
    /// Returns `SubscriptionLost` if the subscription disappears while
    /// waiting and `SubscriberInterrupted` if the wait is interrupted.
    pub async fn get_message(&mut self) -> MessagingResult<Vec<u8>> {
        loop {
            if let Some(payload) = self.try_get_message()? {
                return Ok(payload);
            }

            let notify = Arc::clone(&self.interrupt.notify);
            let idle = self.context.config().lease_renew_interval();
            let woken = tokio::select! {
                update = self.updates.recv() => Wake::Update(update),
                _ = notify.notified() => Wake::Interrupt,
                _ = tokio::time::sleep(idle) => Wake::Idle,
            };

            match woken {
                Wake::Update(Some(update)) => self.handle_update(&update)?,
                Wake::Update(None) => {
                    self.state = SubscriberState::Lost;
                    self.lease_maintainer.stop();
                    return Err(self.lost());
                }
                Wake::Interrupt => {}
                // Ask the queue again in case an earlier request was dropped
                Wake::Idle => self.requested = false,
            }
        }
    }

    fn read_topic(&mut self) -> MessagingResult<Option<Vec<u8>>> {
        let entry = self.current_entry()?;
        let Some(topic) = entry.as_topic() else {
            return Err(self.lost());
        };
        let destination = self.subscription.destination().clone();
        let visible: Vec<MessageIdentifier> = topic.leased().visible_messages().iter().collect();

        for message_id in visible {
            let key = MessageKey::new(destination.clone(), message_id);
            match self.context.read_message(&key, &self.subscription)? {
                ReadOutcome::Read(payload) => {
                    self.context.subscriptions().invoke(&self.subscription, |slot| {
                        if let Some(Subscription::Topic(topic)) = slot {
                            topic.mark_read(message_id);
                        }
                    })?;
                    if self.auto_commit {
                        self.context.commit_topic(&self.subscription)?;
                    }
                    return Ok(Some(payload));
                }
                // Exposure has accepted the message but not stamped it yet
                ReadOutcome::NotReady => return Ok(None),
                ReadOutcome::Missing => {
                    log::debug!("Message {} vanished before {} read it", key, self.subscription);
                    self.context.subscriptions().invoke(&self.subscription, |slot| {
                        if let Some(Subscription::Topic(topic)) = slot {
                            topic.discard(message_id);
                        }
                    })?;
                }
            }
        }
        Ok(None)
    }

    fn read_queue(&mut self) -> MessagingResult<Option<Vec<u8>>> {
        let entry = self.current_entry()?;
        let Some(queue) = entry.as_queue() else {
            return Err(self.lost());
        };
        let destination = self.subscription.destination().clone();
        let held: Vec<MessageIdentifier> = queue
            .leased()
            .visible_messages()
            .iter()
            .filter(|id| !self.read_uncommitted.contains(*id))
            .collect();

        for message_id in held {
            let key = MessageKey::new(destination.clone(), message_id);
            match self.context.read_message(&key, &self.subscription)? {
                ReadOutcome::Read(payload) => {
                    self.read_uncommitted.add(message_id);
                    self.requested = false;
                    if self.auto_commit {
                        self.commit()?;
                    }
                    return Ok(Some(payload));
                }
                ReadOutcome::NotReady => return Ok(None),
                ReadOutcome::Missing => {
                    log::debug!("Message {} vanished before {} read it", key, self.subscription);
                    self.context.subscriptions().invoke(&self.subscription, |slot| {
                        if let Some(Subscription::Queue(queue)) = slot {
                            queue.withdraw(message_id);
                        }
                    })?;
                }
            }
        }

        if !self.requested {
            self.request_message(&destination)?;
        }
        Ok(None)
    }

    fn request_message(&mut self, destination: &Identifier) -> MessagingResult<()> {
        let subscription = self.subscription.clone();
        let known = self.context.destinations().invoke(destination, |slot| match slot {
            Some(Destination::Queue(queue)) => {
                queue.request_message(subscription);
                true
            }
            _ => false,
        })?;
        if !known {
            self.state = SubscriberState::Lost;
            self.lease_maintainer.stop();
            return Err(self.lost());
        }
        self.requested = true;
        self.context.schedule_delivery(destination)
    }

    /// Acknowledge everything read since the last commit or rollback
    pub fn commit(&mut self) -> MessagingResult<usize> {
        self.ensure_active()?;
        match self.kind {
            DestinationKind::Topic => self.context.commit_topic(&self.subscription),
            DestinationKind::Queue => {
                let committed = std::mem::take(&mut self.read_uncommitted);
                if committed.is_empty() {
                    return Ok(0);
                }
                self.context.commit_queue(&self.subscription, &committed)?;
                Ok(committed.size())
            }
        }
    }

    /// Hand back everything read since the last commit
    ///
    /// Topic messages become readable again by this subscriber; queue
    /// messages return to the queue for redelivery to any subscriber.
    pub fn rollback(&mut self) -> MessagingResult<usize> {
        self.ensure_active()?;
        match self.kind {
            DestinationKind::Topic => self.context.rollback_topic_delivery(&self.subscription),
            DestinationKind::Queue => {
                let rolled_back = std::mem::take(&mut self.read_uncommitted);
                self.requested = false;
                self.context
                    .rollback_queue_messages(&self.subscription, &rolled_back)
            }
        }
    }

    /// Remove the subscription for good
    pub fn unsubscribe(&mut self) -> MessagingResult<()> {
        self.ensure_active()?;
        self.lease_maintainer.stop();
        self.state = SubscriberState::Unsubscribed;
        self.context.unsubscribe(&self.subscription)?;
        Ok(())
    }

    /// Detach from the subscription
    ///
    /// A durable subscription is parked and keeps collecting messages for a
    /// later [`crate::messaging::api::MessagingSession::subscribe_existing`];
    /// any other subscription is removed.
    pub fn release(&mut self) -> MessagingResult<()> {
        self.ensure_active()?;
        if !self.durable {
            return self.unsubscribe();
        }
        self.lease_maintainer.stop();
        self.state = SubscriberState::Released;
        self.read_uncommitted = MessageTracker::new();
        self.context.suspend_subscription(&self.subscription)?;
        Ok(())
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.lease_maintainer.stop();
        if let Err(e) = self.context.notifier().unsubscribe(&self.receiver_id) {
            log::debug!("Could not detach update receiver {}: {}", self.receiver_id, e);
        }
    }
}
