use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use super::PopulationError;
use super::conflict::{
    ConflictAction, ConflictDetectingValueMerger, IndexEntryConflict, IndexEntryConflictHandler,
};
use super::progress::PopulationProgress;
use super::tree::{IndexTree, TreeWriter};
use crate::config::PopulationConfig;
use crate::key::{GenericKey, GenericKeyValidator, GenericLayout, Layout, NullValue};
use crate::merge::{
    BlockEntryCursor, Cancellation, CloseCancellation, IndexSample, PartMerger,
    PopulationWorkScheduler,
};
use crate::storage::{
    BlockStorage, BlockStorageMonitor, IndexKeyStorage, IndexUpdateStorage, PAGE_SIZE,
    SharedLayout, StorageError,
};
use crate::update::{IndexEntryUpdate, UpdateMode};
use crate::values::Value;

type Tree = dyn IndexTree<GenericKey, NullValue>;
type ConflictLog = IndexKeyStorage<GenericKey, NullValue>;

/// Progress counters of one scan part, fed by its block storage.
#[derive(Debug, Default)]
struct PartProgress {
    count: AtomicU64,
    merge_started: AtomicBool,
    entries_to_merge: AtomicU64,
    entries_merged: AtomicU64,
}

impl BlockStorageMonitor for PartProgress {
    fn merge_started(&self, entry_count: u64, entries_to_write: u64) {
        self.count.store(entry_count, Ordering::Relaxed);
        self.entries_to_merge.store(entries_to_write, Ordering::Relaxed);
        self.merge_started.store(true, Ordering::Release);
    }

    fn entries_merged(&self, entries: u64) {
        self.entries_merged.fetch_add(entries, Ordering::Relaxed);
    }
}

/// Block storage written by one scanning thread.
struct ScanPart {
    storage: Mutex<Option<BlockStorage<GenericKey, NullValue>>>,
    progress: Arc<PartProgress>,
}

impl ScanPart {
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_storage(&self) -> MutexGuard<'_, Option<BlockStorage<GenericKey, NullValue>>> {
        self.storage.lock().expect("scan part lock poisoned")
    }
}

/// Scan parts in creation order, and which thread owns which.
#[derive(Default)]
struct PartRegistry {
    parts: Vec<Arc<ScanPart>>,
    by_thread: HashMap<ThreadId, usize>,
}

/// Populates an index tree from a store scan plus concurrent updates.
///
/// `add` may be called from many threads at once; each thread writes its
/// own block storage. Everything else is meant to be called by the
/// population driver.
pub struct BlockBasedIndexPopulator {
    base_path: PathBuf,
    layout: GenericLayout,
    shared_layout: SharedLayout<GenericKey, NullValue>,
    tree: Arc<Tree>,
    scheduler: Arc<dyn PopulationWorkScheduler>,
    unique: bool,
    config: PopulationConfig,
    validator: GenericKeyValidator,
    parts: Mutex<PartRegistry>,
    external_updates: Mutex<Option<IndexUpdateStorage>>,
    scan_completed: AtomicBool,
    cancellation: Arc<CloseCancellation>,
    merge_ongoing: Mutex<bool>,
    merge_finished: Condvar,
    sample: Mutex<Option<IndexSample>>,
    updates_since_sample: AtomicU64,
    applied_scan_updates: AtomicU64,
    applied_external_updates: AtomicU64,
}

impl BlockBasedIndexPopulator {
    /// Create a populator whose temporary files are named after `base_path`.
    #[must_use]
    pub fn new(
        base_path: PathBuf,
        number_of_slots: usize,
        unique: bool,
        tree: Arc<Tree>,
        scheduler: Arc<dyn PopulationWorkScheduler>,
        config: PopulationConfig,
    ) -> Self {
        let layout = GenericLayout::new(number_of_slots);
        let external_updates =
            IndexUpdateStorage::new(sibling(&base_path, ".ext"), PAGE_SIZE, layout);
        Self {
            layout,
            shared_layout: Arc::new(layout),
            tree,
            scheduler,
            unique,
            validator: GenericKeyValidator::new(number_of_slots, config.max_key_size),
            config,
            parts: Mutex::new(PartRegistry::default()),
            external_updates: Mutex::new(Some(external_updates)),
            scan_completed: AtomicBool::new(false),
            cancellation: Arc::new(CloseCancellation::new()),
            merge_ongoing: Mutex::new(false),
            merge_finished: Condvar::new(),
            sample: Mutex::new(None),
            updates_since_sample: AtomicU64::new(0),
            applied_scan_updates: AtomicU64::new(0),
            applied_external_updates: AtomicU64::new(0),
            base_path,
        }
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Add entries found by the store scan. Only additions are accepted.
    /// Entries with a missing value are skipped.
    pub fn add(&self, updates: &[IndexEntryUpdate]) -> Result<(), PopulationError> {
        let mut part: Option<Arc<ScanPart>> = None;
        let mut key = self.layout.new_key();
        for update in updates {
            let IndexEntryUpdate::Added { entity_id, values } = update else {
                return Err(PopulationError::InvalidState(format!(
                    "scan produced a {:?} update",
                    update.mode()
                )));
            };
            if ignored(values) {
                continue;
            }
            self.validator.validate(*entity_id, values)?;
            if part.is_none() {
                part = Some(self.thread_part()?);
            }
            let Some(part) = part.as_ref() else {
                continue;
            };
            key.write_values(*entity_id, values)?;
            part.lock_storage()
                .as_mut()
                .ok_or(PopulationError::Closed)?
                .add(&key, &NullValue)?;
        }
        Ok(())
    }

    /// The calling thread's scan part, created on first use.
    fn thread_part(&self) -> Result<Arc<ScanPart>, PopulationError> {
        if self.cancellation.cancelled() {
            return Err(PopulationError::Closed);
        }
        if self.scan_completed.load(Ordering::Acquire) {
            return Err(PopulationError::InvalidState(
                "scan has already been completed".to_string(),
            ));
        }
        let mut registry = self.lock_parts();
        let thread = thread::current().id();
        if let Some(&index) = registry.by_thread.get(&thread) {
            return Ok(Arc::clone(&registry.parts[index]));
        }

        let id = registry.parts.len();
        let progress = Arc::new(PartProgress::default());
        let storage = BlockStorage::new(
            sibling(&self.base_path, &format!(".scan-{id}")),
            self.config.block_size,
            Arc::clone(&self.shared_layout),
            Arc::clone(&progress) as Arc<dyn BlockStorageMonitor>,
        );
        let part = Arc::new(ScanPart {
            storage: Mutex::new(Some(storage)),
            progress,
        });
        registry.parts.push(Arc::clone(&part));
        registry.by_thread.insert(thread, id);
        debug!(part = id, "created scan part");
        Ok(part)
    }

    /// Updater for changes made to the store while population runs.
    ///
    /// Before [`scan_completed`](Self::scan_completed) updates are logged
    /// and replayed later; afterwards they go straight into the tree.
    #[must_use]
    pub fn new_populating_updater(&self) -> PopulatingUpdater<'_> {
        PopulatingUpdater {
            populator: self,
            direct: self.scan_completed.load(Ordering::Acquire),
            closed: false,
        }
    }

    /// Merge everything scanned into the tree, apply the logged updates and,
    /// for unique indexes, resolve duplicates through `conflict_handler`.
    ///
    /// Does nothing if the populator has been closed.
    pub fn scan_completed(
        &self,
        conflict_handler: &dyn IndexEntryConflictHandler,
    ) -> Result<(), PopulationError> {
        if !self.mark_merge_started() {
            return Ok(());
        }
        info!(path = %self.base_path.display(), "index scan completed, building tree");
        let result = self.complete_scan(conflict_handler);
        self.mark_merge_finished();
        match &result {
            Ok(()) => info!(
                path = %self.base_path.display(),
                cancelled = self.cancellation.cancelled(),
                "index tree built"
            ),
            Err(e) => warn!(path = %self.base_path.display(), error = %e, "index population failed"),
        }
        result
    }

    fn mark_merge_started(&self) -> bool {
        let mut ongoing = self.lock_merge_ongoing();
        self.scan_completed.store(true, Ordering::Release);
        if self.cancellation.cancelled() {
            return false;
        }
        *ongoing = true;
        true
    }

    fn mark_merge_finished(&self) {
        *self.lock_merge_ongoing() = false;
        self.merge_finished.notify_all();
    }

    fn complete_scan(
        &self,
        conflict_handler: &dyn IndexEntryConflictHandler,
    ) -> Result<(), PopulationError> {
        let parts = self.lock_parts().parts.clone();
        if !parts.is_empty() {
            self.merge_scan_updates(&parts)?;
        }
        self.lock_external_updates()
            .as_mut()
            .ok_or(PopulationError::Closed)?
            .done_adding()?;
        if self.cancellation.cancelled() {
            return Ok(());
        }

        let mut conflicts = IndexKeyStorage::new(
            sibling(&self.base_path, ".dup"),
            PAGE_SIZE,
            Arc::clone(&self.shared_layout),
        );
        let result = self.build_tree(&parts, &mut conflicts, conflict_handler);
        let closed = conflicts.close();
        result?;
        closed?;
        Ok(())
    }

    /// Merge every part down to one block, one job per part.
    fn merge_scan_updates(&self, parts: &[Arc<ScanPart>]) -> Result<(), PopulationError> {
        let mut handles = Vec::with_capacity(parts.len());
        for (id, part) in parts.iter().enumerate() {
            if let Some(storage) = part.lock_storage().as_mut() {
                storage.done_adding()?;
            }
            let part = Arc::clone(part);
            let cancellation = Arc::clone(&self.cancellation);
            let merge_factor = self.config.merge_factor;
            let job = move || {
                part.lock_storage().as_mut().map_or(Ok(()), |storage| {
                    storage.merge(merge_factor, cancellation.as_ref())
                })
            };
            handles.push(
                self.scheduler
                    .schedule(&format!("block-merge-{id}"), Box::new(job)),
            );
        }

        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.wait() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    fn build_tree(
        &self,
        parts: &[Arc<ScanPart>],
        conflicts: &mut ConflictLog,
        conflict_handler: &dyn IndexEntryConflictHandler,
    ) -> Result<(), PopulationError> {
        let sample = self.write_scan_updates_to_tree(parts, conflicts)?;
        if !self.unique {
            *self.lock_sample() = Some(sample);
        }
        self.write_external_updates_to_tree(conflicts)?;
        if self.unique {
            self.verify_unique_keys(conflicts, conflict_handler)?;
        }
        Ok(())
    }

    fn write_scan_updates_to_tree(
        &self,
        parts: &[Arc<ScanPart>],
        conflicts: &mut ConflictLog,
    ) -> Result<IndexSample, PopulationError> {
        if parts.is_empty() {
            return Ok(IndexSample::default());
        }

        let mut cursors: Vec<Box<dyn BlockEntryCursor<GenericKey, NullValue>>> =
            Vec::with_capacity(parts.len());
        for part in parts {
            let storage = part.lock_storage();
            let mut reader = storage.as_ref().ok_or(PopulationError::Closed)?.reader()?;
            if let Some(block) = reader.next_block()? {
                if reader.next_block()?.is_some() {
                    return Err(PopulationError::InvalidState(
                        "merged scan part has more than one block".to_string(),
                    ));
                }
                cursors.push(Box::new(block));
            }
        }

        let sampling = (!self.unique).then(GenericLayout::value_comparator);
        let cancellation: Arc<dyn Cancellation> = Arc::clone(&self.cancellation) as _;
        let mut merger = PartMerger::new(
            cursors,
            Arc::clone(&self.shared_layout),
            sampling,
            cancellation,
            Arc::clone(&self.scheduler),
            self.config.merge_settings(),
        );
        let written = self.drain_into_tree(&mut merger, conflicts);
        let closed = merger.close();
        match (written, closed) {
            // the merge job's own error says more than the consumer's
            (Err(PopulationError::Storage(StorageError::MergeFailed(_))), Err(e)) => Err(e.into()),
            (Err(e), _) => Err(e),
            (Ok(sample), closed) => {
                closed?;
                Ok(sample)
            }
        }
    }

    fn drain_into_tree(
        &self,
        merger: &mut PartMerger<GenericKey, NullValue>,
        conflicts: &mut ConflictLog,
    ) -> Result<IndexSample, PopulationError> {
        let Some(mut entries) = merger.merge() else {
            return Ok(IndexSample::default());
        };
        let mut feeder = TreeFeeder::new(
            self.tree.writer()?,
            self.layout.new_key(),
            self.unique,
            Some(conflicts),
        );
        while !self.cancellation.cancelled() && entries.next()? {
            feeder.add(entries.key())?;
            self.applied_scan_updates.fetch_add(1, Ordering::Relaxed);
        }
        feeder.close()?;
        debug!(
            entries = self.applied_scan_updates.load(Ordering::Relaxed),
            "scan entries written to tree"
        );
        Ok(merger.sample().unwrap_or_default())
    }

    /// Replay the update log in order. Changes remove the old entry first so
    /// a unique index never holds both.
    fn write_external_updates_to_tree(
        &self,
        conflicts: &mut ConflictLog,
    ) -> Result<(), PopulationError> {
        let mut updates = self
            .lock_external_updates()
            .as_ref()
            .ok_or(PopulationError::Closed)?
            .reader()?;
        let mut feeder = TreeFeeder::new(
            self.tree.writer()?,
            self.layout.new_key(),
            self.unique,
            Some(conflicts),
        );
        while !self.cancellation.cancelled() && updates.next()? {
            match updates.update_mode() {
                Some(UpdateMode::Added) => feeder.add(updates.key())?,
                Some(UpdateMode::Removed) => feeder.remove(updates.key())?,
                Some(UpdateMode::Changed) => {
                    feeder.remove(updates.key())?;
                    feeder.add(updates.key2())?;
                }
                None => break,
            }
            self.applied_external_updates
                .fetch_add(1, Ordering::Relaxed);
            self.updates_since_sample.fetch_add(1, Ordering::Relaxed);
        }
        feeder.close()
    }

    /// Look up every value recorded as a conflict and let `conflict_handler`
    /// judge each entity beyond the first.
    fn verify_unique_keys(
        &self,
        conflicts: &mut ConflictLog,
        conflict_handler: &dyn IndexEntryConflictHandler,
    ) -> Result<(), PopulationError> {
        conflicts.done_adding()?;
        let mut conflicting_keys = conflicts.reader()?;
        let mut key = self.layout.new_key();
        let mut duplicates = Vec::new();
        while !self.cancellation.cancelled() && conflicting_keys.next()? {
            key.copy_from(conflicting_keys.key());
            key.set_compare_id(false);

            let mut seeker = self.tree.seek(&key, &key)?;
            if seeker.next()? {
                let first_entity_id = seeker.key().entity_id();
                while seeker.next()? {
                    let mut duplicate = self.layout.new_key();
                    duplicate.copy_from(seeker.key());
                    let values = duplicate.as_values()?;
                    match conflict_handler.index_entry_conflict(
                        first_entity_id,
                        duplicate.entity_id(),
                        &values,
                    ) {
                        ConflictAction::Throw => {
                            seeker.close()?;
                            return Err(PopulationError::Conflict(IndexEntryConflict {
                                existing_entity_id: first_entity_id,
                                added_entity_id: duplicate.entity_id(),
                                values,
                            }));
                        }
                        ConflictAction::Delete => duplicates.push(duplicate),
                    }
                }
            }
            seeker.close()?;

            if !duplicates.is_empty() {
                let mut writer = self.tree.writer()?;
                for duplicate in duplicates.drain(..) {
                    debug!(entity_id = duplicate.entity_id(), "removing duplicate entry");
                    writer.remove(&duplicate)?;
                }
                writer.close()?;
            }
        }
        Ok(())
    }

    /// Log an update that arrived before the scan completed.
    fn buffer_update(&self, update: &IndexEntryUpdate) -> Result<(), PopulationError> {
        self.lock_external_updates()
            .as_mut()
            .ok_or(PopulationError::Closed)?
            .add(update)?;
        Ok(())
    }

    /// Apply an update that arrived after the scan completed.
    fn apply_update(&self, update: &IndexEntryUpdate) -> Result<(), PopulationError> {
        let mut feeder = TreeFeeder::new(
            self.tree.writer()?,
            self.layout.new_key(),
            self.unique,
            None,
        );
        match update {
            IndexEntryUpdate::Added { entity_id, values } => feeder.add_values(*entity_id, values)?,
            IndexEntryUpdate::Removed { entity_id, values } => {
                feeder.remove_values(*entity_id, values)?;
            }
            IndexEntryUpdate::Changed {
                entity_id,
                before,
                after,
            } => {
                feeder.remove_values(*entity_id, before)?;
                feeder.add_values(*entity_id, after)?;
            }
        }
        self.updates_since_sample.fetch_add(1, Ordering::Relaxed);
        feeder.close()
    }

    /// Sample of a non-unique index, available once the tree is built.
    #[must_use]
    pub fn sample(&self) -> Option<IndexSample> {
        *self.lock_sample()
    }

    /// Updates applied since the sample was taken.
    #[must_use]
    pub fn updates_since_sample(&self) -> u64 {
        self.updates_since_sample.load(Ordering::Relaxed)
    }

    /// Overall progress, given the progress of the store scan.
    ///
    /// The scan weighs 4, merging the parts 1 and building the tree 2. The
    /// first part stands in for all of them while merging.
    #[must_use]
    pub fn progress(&self, scan: PopulationProgress) -> PopulationProgress {
        let parts = self.lock_parts().parts.clone();
        let mut phases = vec![(scan, 4)];

        if let Some(first) = parts.first() {
            let to_merge = first.progress.entries_to_merge.load(Ordering::Relaxed);
            let merge = if !first.progress.merge_started.load(Ordering::Acquire) {
                PopulationProgress::NONE
            } else if to_merge == 0 {
                // a single block needs no merging
                PopulationProgress::DONE
            } else {
                PopulationProgress::single(
                    first.progress.entries_merged.load(Ordering::Relaxed),
                    to_merge,
                )
            };
            phases.push((merge, 1));
        }

        let tree = if parts
            .iter()
            .all(|part| part.progress.merge_started.load(Ordering::Acquire))
        {
            let external = self
                .lock_external_updates()
                .as_ref()
                .map_or(0, IndexUpdateStorage::count);
            let total = parts
                .iter()
                .map(|part| part.progress.count.load(Ordering::Relaxed))
                .sum::<u64>()
                + external;
            PopulationProgress::single(
                self.applied_scan_updates.load(Ordering::Relaxed)
                    + self.applied_external_updates.load(Ordering::Relaxed),
                total,
            )
        } else {
            PopulationProgress::NONE
        };
        phases.push((tree, 2));

        PopulationProgress::weighted(&phases)
    }

    /// Stop any ongoing work, wait for it to wind down and delete every
    /// temporary file. The tree itself is left as is.
    pub fn close(&self) -> Result<(), PopulationError> {
        self.cancellation.cancel();
        self.wait_for_merge();

        let parts = std::mem::take(&mut *self.lock_parts());
        let mut first_error = None;
        for part in parts.parts {
            let storage = part.lock_storage().take();
            if let Some(storage) = storage {
                if let Err(e) = storage.close() {
                    warn!(error = %e, "failed to close scan part");
                    first_error.get_or_insert(e);
                }
            }
        }
        let external_updates = self.lock_external_updates().take();
        if let Some(external_updates) = external_updates {
            if let Err(e) = external_updates.close() {
                warn!(error = %e, "failed to close update log");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn wait_for_merge(&self) {
        let ongoing = self.lock_merge_ongoing();
        drop(
            self.merge_finished
                .wait_while(ongoing, |ongoing| *ongoing)
                .expect("merge state lock poisoned"),
        );
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_parts(&self) -> MutexGuard<'_, PartRegistry> {
        self.parts.lock().expect("parts lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_external_updates(&self) -> MutexGuard<'_, Option<IndexUpdateStorage>> {
        self.external_updates
            .lock()
            .expect("external updates lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_merge_ongoing(&self) -> MutexGuard<'_, bool> {
        self.merge_ongoing.lock().expect("merge state lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_sample(&self) -> MutexGuard<'_, Option<IndexSample>> {
        self.sample.lock().expect("sample lock poisoned")
    }
}

impl std::fmt::Debug for BlockBasedIndexPopulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBasedIndexPopulator")
            .field("base_path", &self.base_path)
            .field("unique", &self.unique)
            .field("scan_completed", &self.scan_completed.load(Ordering::Relaxed))
            .field("cancelled", &self.cancellation.cancelled())
            .finish_non_exhaustive()
    }
}

/// Applies store changes made while an index is populating.
#[derive(Debug)]
pub struct PopulatingUpdater<'a> {
    populator: &'a BlockBasedIndexPopulator,
    direct: bool,
    closed: bool,
}

impl PopulatingUpdater<'_> {
    pub fn process(&mut self, update: &IndexEntryUpdate) -> Result<(), PopulationError> {
        if self.closed {
            return Err(PopulationError::InvalidState(
                "updater has been closed".to_string(),
            ));
        }
        if self.populator.cancellation.cancelled() {
            return Err(PopulationError::Closed);
        }
        let Some(update) = indexable_update(update) else {
            return Ok(());
        };
        if let Some(values) = update.values() {
            self.populator
                .validator
                .validate(update.entity_id(), values)?;
        }
        if self.direct {
            self.populator.apply_update(&update)
        } else {
            self.populator.buffer_update(&update)
        }
    }

    pub const fn close(&mut self) {
        self.closed = true;
    }
}

/// Writes keys into a tree, detecting values shared by several entities.
///
/// With a conflict log, a conflict is recorded and the key inserted anyway
/// under full key order, to be judged later. Without one, a conflict fails
/// the write.
struct TreeFeeder<'w, 'c> {
    writer: Box<dyn TreeWriter<GenericKey, NullValue> + 'w>,
    detector: ConflictDetectingValueMerger,
    conflicts: Option<&'c mut ConflictLog>,
    scratch: GenericKey,
}

impl<'w, 'c> TreeFeeder<'w, 'c> {
    const fn new(
        writer: Box<dyn TreeWriter<GenericKey, NullValue> + 'w>,
        scratch: GenericKey,
        unique: bool,
        conflicts: Option<&'c mut ConflictLog>,
    ) -> Self {
        Self {
            writer,
            detector: ConflictDetectingValueMerger::new(!unique),
            conflicts,
            scratch,
        }
    }

    fn add(&mut self, key: &GenericKey) -> Result<(), PopulationError> {
        self.scratch.copy_from(key);
        self.insert_scratch()
    }

    fn add_values(&mut self, entity_id: i64, values: &[Value]) -> Result<(), PopulationError> {
        self.scratch.write_values(entity_id, values)?;
        self.insert_scratch()
    }

    fn insert_scratch(&mut self) -> Result<(), PopulationError> {
        self.detector.control_conflict_detection(&mut self.scratch);
        self.writer
            .merge(&self.scratch, &NullValue, &mut self.detector)?;
        let Some((existing_entity_id, added_entity_id)) = self.detector.take_conflict() else {
            return Ok(());
        };
        match &mut self.conflicts {
            Some(conflicts) => {
                conflicts.add(&self.scratch)?;
                self.scratch.set_compare_id(true);
                self.writer.put(&self.scratch, &NullValue)?;
                Ok(())
            }
            None => Err(PopulationError::Conflict(IndexEntryConflict {
                existing_entity_id,
                added_entity_id,
                values: self.scratch.as_values()?,
            })),
        }
    }

    fn remove(&mut self, key: &GenericKey) -> Result<(), PopulationError> {
        self.writer.remove(key)?;
        Ok(())
    }

    fn remove_values(&mut self, entity_id: i64, values: &[Value]) -> Result<(), PopulationError> {
        self.scratch.write_values(entity_id, values)?;
        self.writer.remove(&self.scratch)?;
        Ok(())
    }

    fn close(mut self) -> Result<(), PopulationError> {
        self.writer.close()?;
        Ok(())
    }
}

/// Whether an entity's values cannot be indexed at all.
fn ignored(values: &[Value]) -> bool {
    values.is_empty() || values.iter().any(|value| matches!(value, Value::NoValue))
}

/// The update as far as the index is concerned: a change from or to
/// unindexable values becomes an addition or a removal.
fn indexable_update(update: &IndexEntryUpdate) -> Option<Cow<'_, IndexEntryUpdate>> {
    match update {
        IndexEntryUpdate::Added { values, .. } | IndexEntryUpdate::Removed { values, .. } => {
            (!ignored(values)).then_some(Cow::Borrowed(update))
        }
        IndexEntryUpdate::Changed {
            entity_id,
            before,
            after,
        } => match (ignored(before), ignored(after)) {
            (true, true) => None,
            (true, false) => Some(Cow::Owned(IndexEntryUpdate::added(*entity_id, after.clone()))),
            (false, true) => Some(Cow::Owned(IndexEntryUpdate::removed(
                *entity_id,
                before.clone(),
            ))),
            (false, false) => Some(Cow::Borrowed(update)),
        },
    }
}

fn sibling(base_path: &std::path::Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
