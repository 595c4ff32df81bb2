//! Bulk population of a schema index.
//!
//! # Design
//!
//! [`BlockBasedIndexPopulator`] fills an [`IndexTree`] in three phases:
//!
//! 1. **Scan.** Entries from the store scan are encoded into per-thread
//!    [`BlockStorage`](crate::storage::BlockStorage)s, which spill sorted
//!    blocks to disk. Concurrent writes to the store are logged to an
//!    [`IndexUpdateStorage`](crate::storage::IndexUpdateStorage).
//! 2. **Merge.** Every block storage is merged down to a single block, then
//!    a [`PartMerger`](crate::merge::PartMerger) streams all of them, in
//!    order, into one tree writer.
//! 3. **Apply.** Logged updates are replayed against the tree and, for unique
//!    indexes, every value seen twice is checked with an
//!    [`IndexEntryConflictHandler`].
//!
//! # Invariants
//!
//! - Cancellation, set by `close`, stops every phase early without error.
//! - `close` waits for an ongoing `scan_completed` before releasing files.

mod block_based;
mod conflict;
mod progress;
mod tree;

pub use block_based::{BlockBasedIndexPopulator, PopulatingUpdater};
pub use conflict::{
    ConflictAction, IndexEntryConflict, IndexEntryConflictHandler, ThrowingConflictHandler,
};
pub use progress::PopulationProgress;
pub use tree::{IndexTree, MergeOutcome, Seeker, TreeWriter, ValueMerger};

use crate::key::KeyError;
use crate::storage::StorageError;

/// Errors from index population.
#[derive(Debug)]
pub enum PopulationError {
    Storage(StorageError),
    Key(KeyError),
    /// Two entities share a value in a unique index.
    Conflict(IndexEntryConflict),
    /// The populator was closed.
    Closed,
    /// An operation was called in the wrong phase.
    InvalidState(String),
}

impl std::fmt::Display for PopulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Key(e) => write!(f, "key error: {e}"),
            Self::Conflict(conflict) => write!(f, "index entry conflict: {conflict}"),
            Self::Closed => write!(f, "populator is closed"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

impl std::error::Error for PopulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Key(e) => Some(e),
            Self::Conflict(_) | Self::Closed | Self::InvalidState(_) => None,
        }
    }
}

impl From<StorageError> for PopulationError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<KeyError> for PopulationError {
    fn from(e: KeyError) -> Self {
        Self::Key(e)
    }
}
