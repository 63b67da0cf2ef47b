//! Message publishers and their registry
//!
//! A [`MessagePublisher`] owns the sequence ("ticket book") for one
//! destination in one partition. It lives only on the member that owns the
//! partition and is rebuilt from arriving messages after a transfer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::sync::handle_mutex_poison;
use crate::grid::api::{PartitionId, PartitionedCache};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::{
    Identifier, MessageIdentifier, MessageKey, PublishRequestIdentifier,
};
use crate::messaging::message::Message;
use crate::messaging::range::Range;

#[derive(Debug, Default)]
struct PublisherState {
    /// Next sequence number to hand out; `None` until known
    next_sequence: Option<i64>,
    min_arriving: Option<i64>,
    max_arriving: Option<i64>,
    /// Arrived during a transfer but not yet visible
    arriving_unexposed: Range,
    /// Highest request sequence recorded per publishing session
    requests: HashMap<Identifier, i64>,
}

impl PublisherState {
    fn check_request_exists(&mut self, request_id: &PublishRequestIdentifier) -> bool {
        match self.requests.get(request_id.publisher_id()) {
            Some(&seen) if request_id.request_sequence() <= seen => {
                self.requests.remove(request_id.publisher_id());
                true
            }
            _ => false,
        }
    }

    fn save_request(&mut self, request_id: &PublishRequestIdentifier) {
        let seen = self
            .requests
            .entry(request_id.publisher_id().clone())
            .or_insert(request_id.request_sequence());
        if request_id.request_sequence() > *seen {
            *seen = request_id.request_sequence();
        }
    }
}

/// Sequence generator and duplicate-publish guard for one (destination, partition)
#[derive(Debug)]
pub struct MessagePublisher {
    destination: Identifier,
    partition: PartitionId,
    state: Mutex<PublisherState>,
}

impl MessagePublisher {
    pub fn new(destination: Identifier, partition: PartitionId) -> Self {
        Self {
            destination,
            partition,
            state: Mutex::new(PublisherState::default()),
        }
    }

    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    fn lock(&self) -> MessagingResult<MutexGuard<'_, PublisherState>> {
        handle_mutex_poison(self.state.lock(), |message| MessagingError::Runtime {
            message,
        })
    }

    /// Sequence and store one message
    ///
    /// `recover_last_sequence` is consulted only when the ticket book is empty
    /// and must return the highest sequence already observed for this
    /// partition by the destination or its subscriptions. Returns `None` when
    /// the request was already published.
    pub fn publish_message(
        &self,
        messages: &PartitionedCache<MessageKey, Message>,
        request_id: PublishRequestIdentifier,
        payload: Vec<u8>,
        recover_last_sequence: impl FnOnce() -> MessagingResult<Option<i64>>,
    ) -> MessagingResult<Option<MessageIdentifier>> {
        let mut state = self.lock()?;

        if state.check_request_exists(&request_id) {
            log::debug!(
                "Suppressed duplicate publish {} to {}",
                request_id,
                self.destination
            );
            return Ok(None);
        }

        let sequence = match state.next_sequence {
            Some(next) => next,
            None => {
                let recovered = recover_last_sequence()?.unwrap_or(0) + 1;
                log::debug!(
                    "Ticket book for {} partition {} starts at {}",
                    self.destination,
                    self.partition,
                    recovered
                );
                recovered
            }
        };

        let message_id = MessageIdentifier::new(self.partition, sequence);
        let key = MessageKey::new(self.destination.clone(), message_id);
        let message = Message::new(key.clone(), payload, request_id.clone());
        let stored = messages.invoke(&key, |entry| {
            if entry.is_none() {
                *entry = Some(message);
                true
            } else {
                false
            }
        })?;
        if !stored {
            log::warn!("Message {} already present; publish ignored", key);
        }

        state.next_sequence = Some(sequence + 1);
        state.save_request(&request_id);
        Ok(Some(message_id))
    }

    /// Single-use check: a hit consumes the record
    pub fn check_request_exists(&self, request_id: &PublishRequestIdentifier) -> MessagingResult<bool> {
        Ok(self.lock()?.check_request_exists(request_id))
    }

    pub fn save_request(&self, request_id: &PublishRequestIdentifier) -> MessagingResult<()> {
        self.lock()?.save_request(request_id);
        Ok(())
    }

    /// Record a message that arrived with its partition
    ///
    /// The message's publish request is remembered so a retried publish
    /// still finds it after the transfer.
    pub fn save_arriving_message(
        &self,
        message_id: MessageIdentifier,
        request_id: &PublishRequestIdentifier,
        visible: bool,
    ) -> MessagingResult<()> {
        let sequence = message_id.sequence_number();
        let mut state = self.lock()?;
        state.save_request(request_id);
        state.min_arriving = Some(state.min_arriving.map_or(sequence, |min| min.min(sequence)));
        state.max_arriving = Some(state.max_arriving.map_or(sequence, |max| max.max(sequence)));
        if !visible {
            state.arriving_unexposed.add(sequence);
        }
        Ok(())
    }

    /// Continue the sequence after the highest arrived message
    pub fn recreate_ticket_book(&self) -> MessagingResult<()> {
        let mut state = self.lock()?;
        if let Some(max) = state.max_arriving {
            let next = max + 1;
            state.next_sequence = Some(state.next_sequence.map_or(next, |current| current.max(next)));
            log::debug!(
                "Recreated ticket book for {} partition {}: next sequence {}",
                self.destination,
                self.partition,
                next
            );
        }
        Ok(())
    }

    /// Arrived messages still waiting for exposure
    pub fn arriving_unexposed(&self) -> MessagingResult<Range> {
        Ok(self.lock()?.arriving_unexposed.clone())
    }

    /// Lowest and highest arrived sequence numbers seen during the transfer
    pub fn arriving_bounds(&self) -> MessagingResult<Option<(i64, i64)>> {
        let state = self.lock()?;
        Ok(state.min_arriving.zip(state.max_arriving))
    }

    /// Lowest and highest arrived sequence numbers still to be exposed
    pub fn delivery_bounds(&self) -> MessagingResult<Option<(i64, i64)>> {
        let state = self.lock()?;
        Ok(state
            .arriving_unexposed
            .first()
            .zip(state.arriving_unexposed.last()))
    }

    /// Forget transfer bookkeeping
    pub fn reset(&self) -> MessagingResult<()> {
        let mut state = self.lock()?;
        state.min_arriving = None;
        state.max_arriving = None;
        state.arriving_unexposed.clear();
        Ok(())
    }

    pub fn next_sequence(&self) -> MessagingResult<Option<i64>> {
        Ok(self.lock()?.next_sequence)
    }
}

/// Registry of the publishers living on this member
#[derive(Debug, Default)]
pub struct MessagePublisherManager {
    publishers: Mutex<HashMap<(Identifier, PartitionId), Arc<MessagePublisher>>>,
}

impl MessagePublisherManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> MessagingResult<MutexGuard<'_, HashMap<(Identifier, PartitionId), Arc<MessagePublisher>>>> {
        handle_mutex_poison(self.publishers.lock(), |message| MessagingError::Runtime {
            message,
        })
    }

    /// Existing publisher for the pair, or a new empty one
    pub fn ensure_publisher(
        &self,
        destination: &Identifier,
        partition: PartitionId,
    ) -> MessagingResult<Arc<MessagePublisher>> {
        let mut publishers = self.lock()?;
        let publisher = publishers
            .entry((destination.clone(), partition))
            .or_insert_with(|| {
                log::trace!("Creating publisher for {} partition {}", destination, partition);
                Arc::new(MessagePublisher::new(destination.clone(), partition))
            });
        Ok(Arc::clone(publisher))
    }

    pub fn publisher(
        &self,
        destination: &Identifier,
        partition: PartitionId,
    ) -> MessagingResult<Option<Arc<MessagePublisher>>> {
        Ok(self.lock()?.get(&(destination.clone(), partition)).cloned())
    }

    pub fn publishers_for_partition(&self, partition: PartitionId) -> MessagingResult<Vec<Arc<MessagePublisher>>> {
        Ok(self
            .lock()?
            .values()
            .filter(|publisher| publisher.partition() == partition)
            .cloned()
            .collect())
    }

    /// Evict every publisher of a departed partition
    pub fn remove_partition(&self, partition: PartitionId) -> MessagingResult<Vec<Arc<MessagePublisher>>> {
        let mut publishers = self.lock()?;
        let keys: Vec<(Identifier, PartitionId)> = publishers
            .keys()
            .filter(|(_, p)| *p == partition)
            .cloned()
            .collect();
        Ok(keys
            .into_iter()
            .filter_map(|key| publishers.remove(&key))
            .collect())
    }

    pub fn remove_destination(&self, destination: &Identifier) -> MessagingResult<usize> {
        let mut publishers = self.lock()?;
        let before = publishers.len();
        publishers.retain(|(d, _), _| d != destination);
        Ok(before - publishers.len())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
