//! Partitioned publish/subscribe and queue messaging
//!
//! Messages live in a partitioned cache keyed by destination and a
//! per-partition sequence number. Per-destination engines expose newly
//! published messages to topic subscriptions or hand them to queue delivery;
//! subscribers read, commit and roll back through their subscription entries.

// Internal modules - all access should go through api module
pub(crate) mod context;
pub(crate) mod destination;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod event_manager;
pub(crate) mod expose;
pub(crate) mod identifier;
pub(crate) mod message;
pub(crate) mod processor_state;
pub(crate) mod publisher;
pub(crate) mod range;
pub(crate) mod session;
pub(crate) mod subscriber;
pub(crate) mod subscription;
pub(crate) mod tracker;

// Public API module - the only public interface for messaging
pub mod api;

#[cfg(test)]
mod tests;
