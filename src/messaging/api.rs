//! Public API for the messaging layer
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Client surface
pub use crate::messaging::context::{MessagingContext, PartitionTransfer};
pub use crate::messaging::session::MessagingSession;
pub use crate::messaging::subscriber::{InterruptHandle, Subscriber, SubscriberConfig, SubscriberState};

// Errors
pub use crate::messaging::error::{MessagingError, MessagingResult};

// Identities
pub use crate::messaging::identifier::{
    Identifier, MessageIdentifier, MessageKey, PublishRequestIdentifier, SubscriptionIdentifier,
};

// Stored entries and their building blocks
pub use crate::messaging::destination::{
    DeliveryOutcome, Destination, DestinationKind, DestinationStats, Queue, QueueDelivery,
    QueueDeliveryResults, Topic,
};
pub use crate::messaging::message::Message;
pub use crate::messaging::range::Range;
pub use crate::messaging::subscription::{
    LeasedSubscription, QueueSubscription, Subscription, SubscriptionStatus, TopicSubscription,
};
pub use crate::messaging::tracker::{DrainWhere, MessageTracker};

// Engine internals exposed for inspection
pub use crate::messaging::engine::{EngineRegistry, EngineState, MessageEngine};
pub use crate::messaging::expose::MessagesToExpose;
pub use crate::messaging::processor_state::{ProcessorState, ProcessorStateManager};
pub use crate::messaging::publisher::{MessagePublisher, MessagePublisherManager};
