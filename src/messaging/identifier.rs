//! Identifier and key types
//!
//! Every entry in the three backing caches is keyed by one of these types.
//! Message keys carry their own partition so that a message always lives in
//! the same partition as the publisher that sequenced it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::grid::api::{hash_partition, PartitionAware, PartitionId};

/// Opaque, comparable identity for destinations, subscribers and publishers
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Name(String),
    Uuid(Uuid),
}

impl Identifier {
    /// Fresh random identity
    pub fn generate() -> Self {
        Identifier::Uuid(Uuid::new_v4())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Identifier::Name(name) => Some(name),
            Identifier::Uuid(_) => None,
        }
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::Name(name.to_string())
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Identifier::Name(name)
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Identifier::Uuid(uuid)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Name(name) => write!(f, "{}", name),
            Identifier::Uuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

impl PartitionAware for Identifier {
    fn partition(&self, partition_count: u32) -> PartitionId {
        hash_partition(self, partition_count)
    }
}

/// Position of a message within its destination: partition plus sequence
///
/// Ordering is by partition, then by sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageIdentifier {
    partition_id: PartitionId,
    sequence_number: i64,
}

impl MessageIdentifier {
    /// Sentinel meaning "no message"
    pub const NULL: MessageIdentifier = MessageIdentifier {
        partition_id: -1,
        sequence_number: -1,
    };

    pub fn new(partition_id: PartitionId, sequence_number: i64) -> Self {
        Self {
            partition_id,
            sequence_number,
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for MessageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition_id, self.sequence_number)
    }
}

/// Storage key of a message
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    destination: Identifier,
    message_id: MessageIdentifier,
}

impl MessageKey {
    pub fn new(destination: Identifier, message_id: MessageIdentifier) -> Self {
        Self {
            destination,
            message_id,
        }
    }

    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    pub fn message_id(&self) -> MessageIdentifier {
        self.message_id
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.destination, self.message_id)
    }
}

/// Co-located with the publisher that sequenced it, never hashed
impl PartitionAware for MessageKey {
    fn partition(&self, _partition_count: u32) -> PartitionId {
        self.message_id.partition_id
    }
}

/// A subscriber's attachment to one destination
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionIdentifier {
    destination: Identifier,
    subscriber: Identifier,
}

impl SubscriptionIdentifier {
    pub fn new(destination: Identifier, subscriber: Identifier) -> Self {
        Self {
            destination,
            subscriber,
        }
    }

    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    pub fn subscriber(&self) -> &Identifier {
        &self.subscriber
    }
}

impl fmt::Display for SubscriptionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.destination, self.subscriber)
    }
}

impl PartitionAware for SubscriptionIdentifier {
    fn partition(&self, partition_count: u32) -> PartitionId {
        hash_partition(self, partition_count)
    }
}

/// Identity of one publish call, used to suppress re-executed publishes
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublishRequestIdentifier {
    publisher_id: Identifier,
    request_sequence: i64,
}

impl PublishRequestIdentifier {
    pub fn new(publisher_id: Identifier, request_sequence: i64) -> Self {
        Self {
            publisher_id,
            request_sequence,
        }
    }

    pub fn publisher_id(&self) -> &Identifier {
        &self.publisher_id
    }

    pub fn request_sequence(&self) -> i64 {
        self.request_sequence
    }
}

impl fmt::Display for PublishRequestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.publisher_id, self.request_sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_identifier_ordering() {
        let mut ids = vec![
            MessageIdentifier::new(2, 1),
            MessageIdentifier::new(1, 7),
            MessageIdentifier::new(1, 3),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                MessageIdentifier::new(1, 3),
                MessageIdentifier::new(1, 7),
                MessageIdentifier::new(2, 1),
            ]
        );
        assert!(MessageIdentifier::NULL.is_null());
        assert!(!MessageIdentifier::new(0, 0).is_null());
    }

    #[test]
    fn test_message_key_uses_embedded_partition() {
        let key = MessageKey::new(Identifier::from("orders"), MessageIdentifier::new(5, 42));
        assert_eq!(key.partition(31), 5);
        assert_eq!(key.partition(7), 5);
    }

    #[test]
    fn test_identifier_display_and_partition() {
        let named = Identifier::from("orders");
        assert_eq!(named.to_string(), "orders");
        assert_eq!(named.as_name(), Some("orders"));

        let generated = Identifier::generate();
        assert!(generated.as_name().is_none());
        assert_ne!(generated, Identifier::generate());

        let partition = named.partition(31);
        assert!((0..31).contains(&partition));
    }

    #[test]
    fn test_subscription_identifier_display() {
        let id = SubscriptionIdentifier::new(Identifier::from("prices"), Identifier::from("s1"));
        assert_eq!(id.to_string(), "prices/s1");
        assert_eq!(id.destination(), &Identifier::from("prices"));
    }
}
