//! Grid Error Types

use crate::grid::partition::PartitionId;

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Partition {partition} of cache '{cache}' is not owned by this member")]
    PartitionNotOwned {
        cache: String,
        partition: PartitionId,
    },

    #[error("Partition {partition} is out of range for cache '{cache}' ({partition_count} partitions)")]
    InvalidPartition {
        cache: String,
        partition: PartitionId,
        partition_count: u32,
    },

    #[error("Entry belonging to partition {actual} offered to partition {expected} of cache '{cache}'")]
    PartitionMismatch {
        cache: String,
        expected: PartitionId,
        actual: PartitionId,
    },

    #[error("Grid synchronisation error: {message}")]
    Poisoned { message: String },
}

impl crate::core::error_handling::ContextualError for GridError {
    fn is_user_actionable(&self) -> bool {
        false // Ownership and lock failures are member-level conditions
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

/// Result type for grid operations
pub type GridResult<T> = Result<T, GridError>;
