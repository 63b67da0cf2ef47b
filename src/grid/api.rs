//! Public API for the grid substrate
//!
//! External modules should import from here rather than directly from
//! internal modules.

pub use crate::grid::cache::PartitionedCache;
pub use crate::grid::error::{GridError, GridResult};
pub use crate::grid::event::{
    CacheEvent, CacheListener, EntryEventKind, PartitionEvent, PartitionEventKind,
    PartitionListener,
};
pub use crate::grid::lease::{Lease, LeaseCoordinator, LeaseListener, LocalLeaseCoordinator};
pub use crate::grid::partition::{hash_partition, PartitionAware, PartitionId, PartitionService};
