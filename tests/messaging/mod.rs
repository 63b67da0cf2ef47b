//! Messaging integration test modules

pub mod queue;
pub mod topic;
pub mod transfer;
