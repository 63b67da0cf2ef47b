//! In-process partitioned data grid
//!
//! The messaging layer treats storage and coordination as a substrate with
//! three guarantees: atomic per-key invoke, partition ownership with transfer
//! notifications, and entry change notifications. This module provides that
//! substrate for a single member so the engine can run and be tested end to end.

// Internal modules - all access should go through api module
pub(crate) mod cache;
pub(crate) mod error;
pub(crate) mod event;
pub(crate) mod lease;
pub(crate) mod partition;

// Public API module - the only public interface for the grid
pub mod api;

#[cfg(test)]
mod tests;
