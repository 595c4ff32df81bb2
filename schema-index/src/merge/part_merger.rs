//! Merge tree over many sorted parts.
//!
//! # Design
//!
//! Parts are grouped four at a time, level by level. Each full group becomes
//! a [`BlockEntryStreamMerger`] whose output cursor joins the next level; a
//! trailing group of one to three is carried up unmerged. Once a level has at
//! most four nodes, a single root merger combines them and samples its
//! output.
//!
//! Every merger runs as its own scheduled job, so levels merge in parallel and
//! the root can be consumed while leaves are still producing.
//!
//! # Invariants
//!
//! - Carried nodes keep their position relative to merged groups, so equal
//!   keys leave the root in original part order.
//! - `close` halts every merger before waiting on any job.

use std::sync::Arc;

use tracing::{debug, warn};

use super::cancellation::Cancellation;
use super::cursor::BlockEntryCursor;
use super::reader::close_all;
use super::scheduler::{JobHandle, PopulationWorkScheduler};
use super::stream_merger::{BlockEntryStreamMerger, IndexSample, MergeSettings, MergedEntryCursor};
use crate::key::KeyComparator;
use crate::storage::{SharedLayout, StorageError};

/// Fan-in of every merger in the tree.
pub const MERGE_FACTOR: usize = 4;

type Part<K, V> = Box<dyn BlockEntryCursor<K, V>>;

/// Builds, runs and tears down a merge tree.
pub struct PartMerger<K, V> {
    parts: Option<Vec<Part<K, V>>>,
    layout: SharedLayout<K, V>,
    sampling: Option<KeyComparator<K>>,
    cancellation: Arc<dyn Cancellation>,
    scheduler: Arc<dyn PopulationWorkScheduler>,
    settings: MergeSettings,
    mergers: Vec<Arc<BlockEntryStreamMerger<K, V>>>,
    handles: Vec<JobHandle>,
}

impl<K: Send + 'static, V: Send + 'static> PartMerger<K, V> {
    #[must_use]
    pub fn new(
        parts: Vec<Part<K, V>>,
        layout: SharedLayout<K, V>,
        sampling: Option<KeyComparator<K>>,
        cancellation: Arc<dyn Cancellation>,
        scheduler: Arc<dyn PopulationWorkScheduler>,
        settings: MergeSettings,
    ) -> Self {
        Self {
            parts: Some(parts),
            layout,
            sampling,
            cancellation,
            scheduler,
            settings,
            mergers: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Build the tree, schedule every merger and return the root's output.
    ///
    /// The tree is built once; later calls return `None`.
    pub fn merge(&mut self) -> Option<MergedEntryCursor<K, V>> {
        let mut level = self.parts.take()?;
        let part_count = level.len();
        while level.len() > MERGE_FACTOR {
            let mut next_level = Vec::with_capacity(level.len().div_ceil(MERGE_FACTOR));
            let mut nodes = level.into_iter();
            loop {
                let group: Vec<Part<K, V>> = nodes.by_ref().take(MERGE_FACTOR).collect();
                if group.len() < MERGE_FACTOR {
                    next_level.extend(group);
                    break;
                }
                let merger = self.add_merger(group, None);
                next_level.push(Box::new(merger.cursor()));
            }
            level = next_level;
        }
        let root = self.add_merger(level, self.sampling.clone());
        debug!(parts = part_count, mergers = self.mergers.len(), "merge tree scheduled");
        Some(root.cursor())
    }

    fn add_merger(
        &mut self,
        inputs: Vec<Part<K, V>>,
        sampling: Option<KeyComparator<K>>,
    ) -> Arc<BlockEntryStreamMerger<K, V>> {
        let merger = BlockEntryStreamMerger::new(
            inputs,
            Arc::clone(&self.layout),
            sampling,
            Arc::clone(&self.cancellation),
            self.settings,
        );
        let producer = Arc::clone(&merger);
        let name = format!("schema-index-merge-{}", self.mergers.len());
        self.handles
            .push(self.scheduler.schedule(&name, Box::new(move || producer.run())));
        self.mergers.push(Arc::clone(&merger));
        merger
    }

    /// Sample of the root merger's output, once the tree has been built.
    #[must_use]
    pub fn sample(&self) -> Option<IndexSample> {
        self.mergers.last().map(|root| root.build_index_sample())
    }

    /// Halt every merger, wait for every job, then close every merger and
    /// part. All steps run even if earlier ones fail; the first error wins.
    pub fn close(&mut self) -> Result<(), StorageError> {
        for merger in &self.mergers {
            merger.halt();
        }

        let mut first_error = None;
        for handle in self.handles.drain(..) {
            let name = handle.name().to_owned();
            if let Err(e) = handle.wait() {
                warn!(job = %name, error = %e, "merge job failed");
                let e = match e {
                    e @ (StorageError::Io(_) | StorageError::TaskFailed(_)) => e,
                    other => StorageError::TaskFailed(format!("{name}: {other}")),
                };
                first_error.get_or_insert(e);
            }
        }

        for merger in self.mergers.drain(..) {
            if let Err(e) = merger.close() {
                warn!(error = %e, "failed to close merger");
                first_error.get_or_insert(e);
            }
        }
        if let Some(mut parts) = self.parts.take() {
            if let Err(e) = close_all::<K, V, Part<K, V>>(&mut parts) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
