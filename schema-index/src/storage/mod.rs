//! Temporary on-disk storage used while an index is populated.
//!
//! Everything here lives in spill files that are deleted on `close()`; none of
//! it survives a restart.
//!
//! - [`SimpleEntryStorage`]: append-only log of discriminant-tagged records,
//!   written through a page-sized buffer and read back once in write order.
//! - [`IndexUpdateStorage`]: update log for changes that arrive while the scan
//!   is still running.
//! - [`IndexKeyStorage`]: key-only log, used to remember possibly conflicting
//!   keys of unique indexes.
//! - [`BlockStorage`]: per-part sorted blocks, merged down to a single sorted
//!   block before the merge tree consumes them.
//!
//! # Entry Format
//!
//! ```text
//! [size header: 1-3 bytes][key][value]
//! ```
//!
//! See [`dynamic_size`] for the size header.

mod block_entry;
mod block_storage;
pub mod cursor;
pub mod dynamic_size;
mod entry_storage;
mod key_storage;
mod update_storage;

pub use block_entry::BlockEntry;
pub use block_storage::{
    BlockEntryReader, BlockReader, BlockStorage, BlockStorageMonitor, NoopMonitor,
};
pub use cursor::{CursorError, PAGE_SIZE};
pub use entry_storage::{EntryReader, STOP, SimpleEntryStorage};
pub use key_storage::{IndexKeyStorage, KeyEntryCursor};
pub use update_storage::{IndexUpdateCursor, IndexUpdateStorage};

use std::sync::Arc;

use crate::key::{KeyError, Layout};

/// Layout shared between storages, readers and merge tasks.
pub type SharedLayout<K, V> = Arc<dyn Layout<K, V>>;

/// Errors that can occur in temporary population storage.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Stored data is malformed.
    Corruption(String),
    /// Key error while encoding or decoding an entry.
    Key(KeyError),
    /// An entry does not fit the storage's buffer or size header.
    EntryTooLarge { size: usize, max: usize },
    /// The producer of a merged stream failed.
    MergeFailed(String),
    /// A scheduled task failed without an I/O error.
    TaskFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::Key(e) => write!(f, "key error: {e}"),
            Self::EntryTooLarge { size, max } => {
                write!(f, "entry of {size} bytes exceeds maximum of {max} bytes")
            }
            Self::MergeFailed(msg) => write!(f, "merge failed: {msg}"),
            Self::TaskFailed(msg) => write!(f, "task failed: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Key(e) => Some(e),
            Self::Corruption(_)
            | Self::EntryTooLarge { .. }
            | Self::MergeFailed(_)
            | Self::TaskFailed(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<KeyError> for StorageError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::Cursor(e) => e.into(),
            e => Self::Key(e),
        }
    }
}

impl From<CursorError> for StorageError {
    fn from(e: CursorError) -> Self {
        match e {
            CursorError::Io(e) => Self::Io(e),
            e @ CursorError::OutOfBounds { .. } => Self::Corruption(e.to_string()),
        }
    }
}
