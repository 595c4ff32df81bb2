//! External merge of sorted entry streams.
//!
//! Sorted parts are combined by a tree of [`BlockEntryStreamMerger`]s built
//! by [`PartMerger`]. Each merger runs on a [`PopulationWorkScheduler`] job
//! and hands batches to its consumer over a bounded channel, checking a
//! shared [`Cancellation`] between every unit of work.

mod cancellation;
mod cursor;
mod part_merger;
mod reader;
mod scheduler;
mod stream_merger;

pub use cancellation::{Cancellation, CloseCancellation, NeverCancelled};
pub use cursor::{BlockEntryCursor, ListBasedBlockEntryCursor};
pub use part_merger::{MERGE_FACTOR, PartMerger};
pub use reader::{MergingBlockEntryReader, close_all};
pub use scheduler::{Job, JobHandle, PopulationWorkScheduler, ThreadScheduler, TokioScheduler};
pub use stream_merger::{
    BlockEntryStreamMerger, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, IndexSample,
    MergeSettings, MergedEntryCursor, QUEUE_SIZE,
};
