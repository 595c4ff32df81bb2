//! Concurrent k-way merge of sorted cursors.
//!
//! # Design
//!
//! A [`BlockEntryStreamMerger`] has a producer side and a consumer side that
//! run on different threads:
//!
//! - The producer ([`run`](BlockEntryStreamMerger::run)) merges its inputs
//!   with a [`MergingBlockEntryReader`], copies entries into batches of
//!   `batch_size` and sends each batch over a bounded channel.
//! - The consumer ([`MergedEntryCursor`]) receives batches and presents them
//!   as one sorted [`BlockEntryCursor`], so a merger can feed another merger.
//!
//! # Invariants
//!
//! - The producer owns the only sender and drops it when it exits, after
//!   recording any failure. A disconnected channel therefore means every
//!   batch has been received.
//! - Both sides block for at most `poll_interval` at a time and re-check
//!   `halted` and the cancellation between attempts.
//! - The running sample is published before each batch is sent.
//! - A cancelled or halted merge ends without error; the output produced so
//!   far stays valid.

use std::cmp::Ordering as KeyOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use tracing::debug;

use super::cancellation::Cancellation;
use super::cursor::{BlockEntryCursor, ListBasedBlockEntryCursor};
use super::reader::{MergingBlockEntryReader, close_all};
use crate::key::KeyComparator;
use crate::storage::{BlockEntry, SharedLayout, StorageError};

/// Entries per batch handed from producer to consumer.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Batches a merger buffers before its producer blocks.
pub const QUEUE_SIZE: usize = 10;

/// Longest single wait on either side of the channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tuning of a stream merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: QUEUE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Approximate entry and distinct-value counts of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSample {
    pub index_size: u64,
    pub unique_values: u64,
    pub sample_size: u64,
}

impl IndexSample {
    #[must_use]
    pub const fn new(index_size: u64, unique_values: u64, sample_size: u64) -> Self {
        Self {
            index_size,
            unique_values,
            sample_size,
        }
    }
}

type Input<K, V> = Box<dyn BlockEntryCursor<K, V>>;
type Batch<K, V> = ListBasedBlockEntryCursor<K, V>;

/// Merges sorted inputs on a producer task and streams the result in
/// batches.
pub struct BlockEntryStreamMerger<K, V> {
    inputs: Mutex<Vec<Input<K, V>>>,
    layout: SharedLayout<K, V>,
    sampling: Option<KeyComparator<K>>,
    cancellation: Arc<dyn Cancellation>,
    settings: MergeSettings,
    sender: Mutex<Option<Sender<Batch<K, V>>>>,
    receiver: Receiver<Batch<K, V>>,
    halted: AtomicBool,
    failed: AtomicBool,
    inputs_closed: AtomicBool,
    sampled: AtomicU64,
    unique: AtomicU64,
}

impl<K: Send + 'static, V: Send + 'static> BlockEntryStreamMerger<K, V> {
    /// Create a merger. `sampling`, when given, decides which adjacent
    /// output keys count as the same value.
    #[must_use]
    pub fn new(
        inputs: Vec<Input<K, V>>,
        layout: SharedLayout<K, V>,
        sampling: Option<KeyComparator<K>>,
        cancellation: Arc<dyn Cancellation>,
        settings: MergeSettings,
    ) -> Arc<Self> {
        let (sender, receiver) = bounded(settings.queue_capacity.max(1));
        Arc::new(Self {
            inputs: Mutex::new(inputs),
            layout,
            sampling,
            cancellation,
            sender: Mutex::new(Some(sender)),
            receiver,
            settings: MergeSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            halted: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            inputs_closed: AtomicBool::new(false),
            sampled: AtomicU64::new(0),
            unique: AtomicU64::new(0),
        })
    }

    /// Consumer side of this merger.
    #[must_use]
    pub fn cursor(self: &Arc<Self>) -> MergedEntryCursor<K, V> {
        MergedEntryCursor {
            merger: Arc::clone(self),
            current: None,
        }
    }

    /// Producer loop. Runs until the inputs are exhausted, the merger is
    /// halted, or the merge is cancelled.
    pub fn run(&self) -> Result<(), StorageError> {
        let Some(sender) = self.lock_sender().take() else {
            // halted or closed before it started
            return Ok(());
        };
        let result = self.merge(&sender);
        if result.is_err() {
            self.failed.store(true, Ordering::Release);
        }
        self.halted.store(true, Ordering::Release);
        drop(sender);
        result
    }

    fn merge(&self, sender: &Sender<Batch<K, V>>) -> Result<(), StorageError> {
        let mut inputs = self.lock_inputs();
        if self.inputs_closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let layout = self.layout.as_ref();
        let mut reader = MergingBlockEntryReader::new(layout, &mut inputs[..]);
        let mut batch = Vec::with_capacity(self.settings.batch_size);
        let mut previous = layout.new_key();
        let mut has_previous = false;
        let (mut sampled, mut unique) = (0u64, 0u64);
        let mut merged = 0u64;

        while !self.should_stop() && reader.next()? {
            let key = reader.key();
            if let Some(comparator) = &self.sampling {
                sampled += 1;
                if !has_previous || comparator(&previous, key) != KeyOrdering::Equal {
                    unique += 1;
                }
                layout.copy_key(key, &mut previous);
                has_previous = true;
            }
            batch.push(BlockEntry::copied(layout, key, reader.value()));
            merged += 1;
            if batch.len() >= self.settings.batch_size {
                let full = std::mem::replace(
                    &mut batch,
                    Vec::with_capacity(self.settings.batch_size),
                );
                self.publish_sample(sampled, unique);
                if !self.offer(sender, full) {
                    debug!(entries = merged, "stream merge stopped while offering a batch");
                    break;
                }
            }
        }
        self.publish_sample(sampled, unique);
        if !batch.is_empty() {
            let tail = batch.len();
            if !self.offer(sender, batch) {
                debug!(entries = tail, "final batch of stream merge dropped");
            }
        }

        debug!(
            entries = merged,
            halted = self.halted.load(Ordering::Acquire),
            cancelled = self.cancellation.cancelled(),
            "stream merge finished"
        );
        Ok(())
    }

    /// Send a batch until it is taken or the merge should stop.
    fn offer(&self, sender: &Sender<Batch<K, V>>, batch: Vec<BlockEntry<K, V>>) -> bool {
        let mut item = ListBasedBlockEntryCursor::new(batch);
        loop {
            if self.should_stop() {
                return false;
            }
            match sender.send_timeout(item, self.settings.poll_interval) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn publish_sample(&self, sampled: u64, unique: u64) {
        self.sampled.store(sampled, Ordering::Release);
        self.unique.store(unique, Ordering::Release);
    }

    fn should_stop(&self) -> bool {
        self.halted.load(Ordering::Acquire) || self.cancellation.cancelled()
    }

    /// Ask the producer to stop. Idempotent and callable from any thread.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        // a producer that never started will not send anything
        drop(self.lock_sender().take());
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Sample gathered by the producer so far: `(sampled, unique, sampled)`.
    #[must_use]
    pub fn build_index_sample(&self) -> IndexSample {
        let sampled = self.sampled.load(Ordering::Acquire);
        IndexSample::new(sampled, self.unique.load(Ordering::Acquire), sampled)
    }

    /// Halt, close every input once, and drop batches not yet received.
    pub fn close(&self) -> Result<(), StorageError> {
        self.halt();
        let result = if self.inputs_closed.swap(true, Ordering::AcqRel) {
            Ok(())
        } else {
            close_all::<K, V, Input<K, V>>(&mut self.lock_inputs())
        };
        while self.receiver.try_recv().is_ok() {}
        result
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_inputs(&self) -> MutexGuard<'_, Vec<Input<K, V>>> {
        self.inputs.lock().expect("merger inputs lock poisoned")
    }

    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    fn lock_sender(&self) -> MutexGuard<'_, Option<Sender<Batch<K, V>>>> {
        self.sender.lock().expect("merger sender lock poisoned")
    }
}

impl<K, V> std::fmt::Debug for BlockEntryStreamMerger<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEntryStreamMerger")
            .field("settings", &self.settings)
            .field("halted", &self.halted.load(Ordering::Relaxed))
            .field("queued", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

/// Consumer side of a [`BlockEntryStreamMerger`].
pub struct MergedEntryCursor<K, V> {
    merger: Arc<BlockEntryStreamMerger<K, V>>,
    current: Option<Batch<K, V>>,
}

impl<K: Send + 'static, V: Send + 'static> MergedEntryCursor<K, V> {
    #[must_use]
    pub const fn merger(&self) -> &Arc<BlockEntryStreamMerger<K, V>> {
        &self.merger
    }

    #[allow(clippy::expect_used)] // key() and value() require a successful next()
    fn current(&self) -> &Batch<K, V> {
        self.current.as_ref().expect("no current entry")
    }
}

impl<K: Send + 'static, V: Send + 'static> BlockEntryCursor<K, V> for MergedEntryCursor<K, V> {
    fn next(&mut self) -> Result<bool, StorageError> {
        let merger = &self.merger;
        loop {
            if let Some(batch) = self.current.as_mut() {
                if batch.next()? {
                    return Ok(true);
                }
                self.current = None;
            }

            match merger.receiver.recv_timeout(merger.settings.poll_interval) {
                Ok(batch) => self.current = Some(batch),
                Err(RecvTimeoutError::Disconnected) => {
                    if merger.failed.load(Ordering::Acquire) {
                        return Err(StorageError::MergeFailed(
                            "producer of merged stream failed".to_owned(),
                        ));
                    }
                    return Ok(false);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if merger.cancellation.cancelled() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn key(&self) -> &K {
        self.current().key()
    }

    fn value(&self) -> &V {
        self.current().value()
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.current = None;
        self.merger.close()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::merge::{CloseCancellation, NeverCancelled};
    use crate::testing::{LongLayout, TestValue, init_tracing};

    fn settings(batch_size: usize) -> MergeSettings {
        MergeSettings {
            batch_size,
            queue_capacity: 2,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn input(entries: &[(i64, &str)]) -> Input<i64, TestValue> {
        Box::new(ListBasedBlockEntryCursor::new(
            entries
                .iter()
                .map(|&(key, value)| BlockEntry::new(key, TestValue::from(value)))
                .collect(),
        ))
    }

    fn merger(
        inputs: Vec<Input<i64, TestValue>>,
        batch_size: usize,
        sampling: bool,
        cancellation: Arc<dyn Cancellation>,
    ) -> Arc<BlockEntryStreamMerger<i64, TestValue>> {
        let comparator: Option<KeyComparator<i64>> = if sampling {
            Some(Arc::new(|a: &i64, b: &i64| a.cmp(b)))
        } else {
            None
        };
        BlockEntryStreamMerger::new(
            inputs,
            Arc::new(LongLayout),
            comparator,
            cancellation,
            settings(batch_size),
        )
    }

    fn drain(cursor: &mut MergedEntryCursor<i64, TestValue>) -> Vec<(i64, String)> {
        let mut entries = Vec::new();
        while cursor.next().expect("next") {
            entries.push((*cursor.key(), cursor.value().as_str().to_owned()));
        }
        entries
    }

    fn run_and_drain(merger: &Arc<BlockEntryStreamMerger<i64, TestValue>>) -> Vec<(i64, String)> {
        let producer = {
            let merger = Arc::clone(merger);
            thread::spawn(move || merger.run())
        };
        let entries = drain(&mut merger.cursor());
        producer.join().expect("producer").expect("merge");
        entries
    }

    #[test]
    fn test_three_inputs_merge_in_order() {
        init_tracing();
        let merger = merger(
            vec![input(&[(1, "a"), (3, "c")]), input(&[(2, "b")]), input(&[])],
            2,
            false,
            Arc::new(NeverCancelled),
        );
        assert_eq!(
            run_and_drain(&merger),
            vec![(1, "a".to_owned()), (2, "b".to_owned()), (3, "c".to_owned())]
        );
        merger.close().expect("close");
    }

    #[test]
    fn test_merge_is_sorted_union_for_any_input_count() {
        let mut rng = StdRng::seed_from_u64(17);
        for input_count in [0, 1, 4, 5, 17] {
            for total in [0, 1, 7, 100, 350] {
                let mut parts: Vec<Vec<i64>> = vec![Vec::new(); input_count];
                if input_count > 0 {
                    for _ in 0..total {
                        let part = rng.random_range(0..input_count);
                        parts[part].push(rng.random_range(-50..50));
                    }
                }
                let mut expected: Vec<i64> = parts.iter().flatten().copied().collect();
                expected.sort_unstable();

                let inputs = parts
                    .iter_mut()
                    .map(|part| {
                        part.sort_unstable();
                        let entries: Vec<(i64, &str)> = part.iter().map(|&k| (k, "")).collect();
                        input(&entries)
                    })
                    .collect();
                let merger = merger(inputs, 7, false, Arc::new(NeverCancelled));
                let merged: Vec<i64> = run_and_drain(&merger).into_iter().map(|(k, _)| k).collect();
                assert_eq!(merged, expected, "{input_count} inputs, {total} entries");
            }
        }
    }

    #[test]
    fn test_sampling_counts_runs_of_equal_keys() {
        let merger = merger(
            vec![
                input(&[(1, ""), (1, ""), (2, ""), (5, "")]),
                input(&[(1, ""), (3, ""), (5, ""), (5, "")]),
            ],
            3,
            true,
            Arc::new(NeverCancelled),
        );
        assert_eq!(run_and_drain(&merger).len(), 8);
        assert_eq!(merger.build_index_sample(), IndexSample::new(8, 4, 8));
    }

    #[test]
    fn test_without_sampling_sample_is_empty() {
        let merger = merger(vec![input(&[(1, "")])], 3, false, Arc::new(NeverCancelled));
        run_and_drain(&merger);
        assert_eq!(merger.build_index_sample(), IndexSample::default());
    }

    #[test]
    fn test_halt_stops_blocked_producer() {
        let entries: Vec<(i64, &str)> = (0..10_000).map(|k| (k, "")).collect();
        let merger = merger(vec![input(&entries)], 1, false, Arc::new(NeverCancelled));
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };

        // nobody consumes: the producer fills the channel and keeps offering
        thread::sleep(Duration::from_millis(20));
        merger.halt();
        merger.halt();
        producer.join().expect("producer").expect("halted merge");
        assert!(merger.is_halted());
        merger.close().expect("close");
        merger.close().expect("second close");
    }

    #[test]
    fn test_cancellation_ends_stream_without_error() {
        let entries: Vec<(i64, &str)> = (0..10_000).map(|k| (k, "")).collect();
        let cancellation = Arc::new(CloseCancellation::new());
        let merger = merger(vec![input(&entries)], 10, false, cancellation.clone());
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };

        let mut cursor = merger.cursor();
        assert!(cursor.next().expect("first entry"));
        cancellation.cancel();
        let mut seen = 1;
        while cursor.next().expect("next") {
            seen += 1;
        }
        assert!(seen < 10_000);
        producer.join().expect("producer").expect("cancelled merge");
        cursor.close().expect("close");
    }

    #[test]
    fn test_producer_failure_surfaces_to_consumer() {
        struct FailingCursor;

        impl BlockEntryCursor<i64, TestValue> for FailingCursor {
            fn next(&mut self) -> Result<bool, StorageError> {
                Err(StorageError::Corruption("broken input".to_owned()))
            }

            fn key(&self) -> &i64 {
                &0
            }

            fn value(&self) -> &TestValue {
                unreachable!("never positioned")
            }
        }

        let merger = merger(vec![Box::new(FailingCursor)], 2, false, Arc::new(NeverCancelled));
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };
        let mut cursor = merger.cursor();
        assert!(matches!(cursor.next(), Err(StorageError::MergeFailed(_))));
        assert!(matches!(
            producer.join().expect("producer"),
            Err(StorageError::Corruption(_))
        ));
    }

    /// Yields its entries, then runs `after` once the list is exhausted.
    struct ThenCursor<F> {
        inner: ListBasedBlockEntryCursor<i64, TestValue>,
        after: F,
    }

    impl<F> BlockEntryCursor<i64, TestValue> for ThenCursor<F>
    where
        F: FnMut() -> Result<(), StorageError> + Send,
    {
        fn next(&mut self) -> Result<bool, StorageError> {
            if self.inner.next()? {
                return Ok(true);
            }
            (self.after)()?;
            Ok(false)
        }

        fn key(&self) -> &i64 {
            self.inner.key()
        }

        fn value(&self) -> &TestValue {
            self.inner.value()
        }
    }

    fn then_cursor<F>(keys: &[i64], after: F) -> Input<i64, TestValue>
    where
        F: FnMut() -> Result<(), StorageError> + Send + 'static,
    {
        Box::new(ThenCursor {
            inner: ListBasedBlockEntryCursor::new(
                keys.iter()
                    .map(|&key| BlockEntry::new(key, TestValue::from("")))
                    .collect(),
            ),
            after,
        })
    }

    #[test]
    fn test_sample_is_visible_once_a_batch_is_received() {
        let entries: Vec<(i64, &str)> = (0..1_000).map(|k| (k, "")).collect();
        let merger = merger(vec![input(&entries)], 4, true, Arc::new(NeverCancelled));
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };

        let mut cursor = merger.cursor();
        assert!(cursor.next().expect("first entry"));
        let sample = merger.build_index_sample();
        assert!(sample.sample_size >= 4, "{sample:?}");
        assert!(sample.unique_values >= 4, "{sample:?}");

        merger.halt();
        producer.join().expect("producer").expect("halted merge");
        cursor.close().expect("close");
    }

    #[test]
    fn test_sample_survives_producer_failure() {
        let failing = then_cursor(&[1, 2, 3], || {
            Err(StorageError::Corruption("broken input".to_owned()))
        });
        let merger = merger(vec![failing], 2, true, Arc::new(NeverCancelled));
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };

        let mut cursor = merger.cursor();
        let mut seen = Vec::new();
        let failure = loop {
            match cursor.next() {
                Ok(true) => seen.push(*cursor.key()),
                Ok(false) => panic!("stream ended without the producer error"),
                Err(error) => break error,
            }
        };
        assert!(matches!(failure, StorageError::MergeFailed(_)));
        assert_eq!(seen, vec![1, 2]);
        assert!(producer.join().expect("producer").is_err());
        assert_eq!(merger.build_index_sample(), IndexSample::new(2, 2, 2));
    }

    #[test]
    fn test_tail_batch_dropped_when_cancelled_at_end_of_input() {
        init_tracing();
        let cancellation = Arc::new(CloseCancellation::new());
        let cancel = Arc::clone(&cancellation);
        let last = then_cursor(&[1, 2, 3], move || {
            cancel.cancel();
            Ok(())
        });
        let merger = merger(vec![last], 10, false, cancellation);
        let producer = {
            let merger = Arc::clone(&merger);
            thread::spawn(move || merger.run())
        };

        assert!(drain(&mut merger.cursor()).is_empty());
        producer.join().expect("producer").expect("cancelled merge");
    }

    #[test]
    fn test_halt_before_run_ends_consumer() {
        let merger = merger(vec![input(&[(1, "")])], 1, false, Arc::new(NeverCancelled));
        merger.halt();
        assert!(drain(&mut merger.cursor()).is_empty());
        merger.run().expect("run after halt");
        merger.close().expect("close");
    }
}
