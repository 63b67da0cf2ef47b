//! Partitioned publish/subscribe and point-to-point messaging over an
//! in-process data grid
//!
//! Client code goes through [`messaging::api`]; the grid substrate and the
//! subscription notifier are available through [`grid::api`] and
//! [`notifications::api`].

pub mod app;
pub mod core;
pub mod grid;
pub mod messaging;
pub mod notifications;
