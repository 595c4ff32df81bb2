//! Sorted, checksummed blocks of entries for one population part.
//!
//! # Design
//!
//! Entries are buffered in memory until the next one would push the encoded
//! size past `block_size`. The buffer is then stable-sorted and appended to
//! the spill file as one block. After the scan, [`BlockStorage::merge`]
//! repeatedly merges groups of blocks into a second file and swaps it in, until
//! a single sorted block remains.
//!
//! # Block Format
//!
//! ```text
//! [entry count: u64][byte length: u64][crc32: u32]
//! [entry][entry]...
//! ```
//!
//! The CRC covers the entry bytes and is verified once a reader has consumed
//! every entry of the block.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Take, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crc32fast::Hasher;
use tracing::debug;

use super::block_entry::BlockEntry;
use super::cursor::{ChannelCursor, ReadCursor, SliceCursor};
use super::{SharedLayout, StorageError};
use crate::merge::{BlockEntryCursor, Cancellation, MergingBlockEntryReader};

const BLOCK_HEADER_SIZE: usize = 8 + 8 + 4;

/// Observes block storage activity, for progress reporting.
pub trait BlockStorageMonitor: Send + Sync {
    fn entry_added(&self, _entry_size: usize) {}

    fn block_flushed(&self, _entry_count: u64, _byte_length: u64) {}

    /// `entries_to_write` counts every entry write across all merge passes.
    fn merge_started(&self, _entry_count: u64, _entries_to_write: u64) {}

    fn entries_merged(&self, _entries: u64) {}

    fn merge_iteration_finished(&self, _blocks_before: u64, _blocks_after: u64) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl BlockStorageMonitor for NoopMonitor {}

/// Buffers entries into sorted blocks on disk.
pub struct BlockStorage<K, V> {
    layout: SharedLayout<K, V>,
    path: PathBuf,
    merge_path: PathBuf,
    block_size: usize,
    buffer: Vec<BlockEntry<K, V>>,
    buffered_size: usize,
    file: Option<BufWriter<File>>,
    number_of_blocks: u64,
    count: u64,
    entries_merged: u64,
    done: bool,
    monitor: Arc<dyn BlockStorageMonitor>,
}

impl<K, V> BlockStorage<K, V> {
    #[must_use]
    pub fn new(
        path: PathBuf,
        block_size: usize,
        layout: SharedLayout<K, V>,
        monitor: Arc<dyn BlockStorageMonitor>,
    ) -> Self {
        let mut merge_path = path.clone().into_os_string();
        merge_path.push(".merge");
        Self {
            layout,
            path,
            merge_path: merge_path.into(),
            block_size,
            buffer: Vec::new(),
            buffered_size: 0,
            file: None,
            number_of_blocks: 0,
            count: 0,
            entries_merged: 0,
            done: false,
            monitor,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries added so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Entries written by merge passes so far.
    #[must_use]
    pub const fn entries_merged(&self) -> u64 {
        self.entries_merged
    }

    /// Blocks currently in the spill file.
    #[must_use]
    pub const fn number_of_blocks(&self) -> u64 {
        self.number_of_blocks
    }

    pub fn add(&mut self, key: &K, value: &V) -> Result<(), StorageError> {
        if self.done {
            return Err(StorageError::Corruption(format!(
                "{} is already complete",
                self.path.display()
            )));
        }
        let layout = self.layout.as_ref();
        let entry_size = BlockEntry::entry_size(layout, key, value)?;
        if !self.buffer.is_empty() && self.buffered_size + entry_size > self.block_size {
            self.flush()?;
        }
        let layout = self.layout.as_ref();
        self.buffer.push(BlockEntry::copied(layout, key, value));
        self.buffered_size += entry_size;
        self.count += 1;
        self.monitor.entry_added(entry_size);
        Ok(())
    }

    /// Spill the remaining buffered entries. No entries can be added after.
    pub fn done_adding(&mut self) -> Result<(), StorageError> {
        if self.done {
            return Ok(());
        }
        self.flush()?;
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.done = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let layout = self.layout.as_ref();
        self.buffer
            .sort_by(|lhs, rhs| layout.compare(lhs.key(), rhs.key()));

        let mut bytes: Vec<u8> = Vec::with_capacity(self.buffered_size);
        for entry in &self.buffer {
            BlockEntry::write(&mut bytes, layout, entry.key(), entry.value())?;
        }
        let entry_count = self.buffer.len() as u64;

        let file = match self.file.take() {
            Some(file) => file,
            None => BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.path)?,
            ),
        };
        let file = self.file.insert(file);
        file.write_all(&block_header(entry_count, bytes.len() as u64, crc32fast::hash(&bytes)))?;
        file.write_all(&bytes)?;

        self.number_of_blocks += 1;
        self.buffer.clear();
        self.buffered_size = 0;
        self.monitor.block_flushed(entry_count, bytes.len() as u64);
        Ok(())
    }

    /// Merge blocks `merge_factor` at a time until one block remains.
    ///
    /// Returns early, without error, once `cancellation` fires; the storage
    /// is then only fit to be closed.
    pub fn merge(
        &mut self,
        merge_factor: usize,
        cancellation: &dyn Cancellation,
    ) -> Result<(), StorageError>
    where
        K: Send,
        V: Send,
    {
        if !self.done {
            return Err(StorageError::Corruption(format!(
                "{} merged before it was complete",
                self.path.display()
            )));
        }
        let merge_factor = merge_factor.max(2);
        self.monitor.merge_started(
            self.count,
            self.count * merge_passes(self.number_of_blocks, merge_factor),
        );
        while self.number_of_blocks > 1 {
            if cancellation.cancelled() {
                return Ok(());
            }
            let blocks_before = self.number_of_blocks;
            let Some(blocks_after) = self.merge_pass(merge_factor, cancellation)? else {
                debug!(path = %self.path.display(), "block merge cancelled");
                return Ok(());
            };
            std::fs::rename(&self.merge_path, &self.path)?;
            self.number_of_blocks = blocks_after;
            self.monitor
                .merge_iteration_finished(blocks_before, blocks_after);
            debug!(
                path = %self.path.display(),
                blocks_before,
                blocks_after,
                "block merge pass finished"
            );
        }
        Ok(())
    }

    /// One pass over the spill file. `None` if cancelled.
    fn merge_pass(
        &mut self,
        merge_factor: usize,
        cancellation: &dyn Cancellation,
    ) -> Result<Option<u64>, StorageError>
    where
        K: Send,
        V: Send,
    {
        let mut reader = self.reader()?;
        let mut writer = BufWriter::new(File::create(&self.merge_path)?);
        let layout = self.layout.as_ref();
        let mut scratch: Vec<u8> = Vec::new();
        let mut blocks_written = 0;

        loop {
            let mut sources = Vec::with_capacity(merge_factor);
            while sources.len() < merge_factor {
                match reader.next_block()? {
                    Some(block) => sources.push(block),
                    None => break,
                }
            }
            if sources.is_empty() {
                break;
            }

            let header_position = writer.stream_position()?;
            writer.write_all(&[0; BLOCK_HEADER_SIZE])?;
            let mut hasher = Hasher::new();
            let mut entry_count = 0u64;
            let mut byte_length = 0u64;

            let mut merged = MergingBlockEntryReader::new(layout, &mut sources);
            while merged.next()? {
                if cancellation.cancelled() {
                    return Ok(None);
                }
                scratch.clear();
                BlockEntry::write(&mut scratch, layout, merged.key(), merged.value())?;
                hasher.update(&scratch);
                writer.write_all(&scratch)?;
                entry_count += 1;
                byte_length += scratch.len() as u64;
                self.entries_merged += 1;
                self.monitor.entries_merged(1);
            }
            merged.close()?;

            writer.seek(SeekFrom::Start(header_position))?;
            writer.write_all(&block_header(entry_count, byte_length, hasher.finalize()))?;
            writer.seek(SeekFrom::End(0))?;
            blocks_written += 1;
        }
        writer.flush()?;
        Ok(Some(blocks_written))
    }

    /// Read the blocks back. Only valid after [`done_adding`](Self::done_adding).
    pub fn reader(&self) -> Result<BlockReader<K, V>, StorageError> {
        if !self.done {
            return Err(StorageError::Corruption(format!(
                "{} read before it was complete",
                self.path.display()
            )));
        }
        let file_length = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(BlockReader {
            layout: Arc::clone(&self.layout),
            path: self.path.clone(),
            file_length,
            offset: 0,
        })
    }

    /// Delete the spill files.
    pub fn close(mut self) -> Result<(), StorageError> {
        self.file = None;
        self.buffer.clear();
        let mut result = remove_if_exists(&self.path);
        if let Err(e) = remove_if_exists(&self.merge_path) {
            result = result.and(Err(e));
        }
        result
    }
}

impl<K, V> std::fmt::Debug for BlockStorage<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStorage")
            .field("path", &self.path)
            .field("count", &self.count)
            .field("number_of_blocks", &self.number_of_blocks)
            .finish_non_exhaustive()
    }
}

/// Passes needed to merge `blocks` blocks into one.
fn merge_passes(mut blocks: u64, merge_factor: usize) -> u64 {
    let mut passes = 0;
    while blocks > 1 {
        blocks = blocks.div_ceil(merge_factor as u64);
        passes += 1;
    }
    passes
}

fn block_header(entry_count: u64, byte_length: u64, crc: u32) -> [u8; BLOCK_HEADER_SIZE] {
    let mut header = [0; BLOCK_HEADER_SIZE];
    header[..8].copy_from_slice(&entry_count.to_le_bytes());
    header[8..16].copy_from_slice(&byte_length.to_le_bytes());
    header[16..].copy_from_slice(&crc.to_le_bytes());
    header
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Iterates the blocks of a completed [`BlockStorage`].
pub struct BlockReader<K, V> {
    layout: SharedLayout<K, V>,
    path: PathBuf,
    file_length: u64,
    offset: u64,
}

impl<K, V> BlockReader<K, V> {
    /// Open the next block on its own file handle.
    pub fn next_block(&mut self) -> Result<Option<BlockEntryReader<K, V>>, StorageError> {
        if self.offset >= self.file_length {
            return Ok(None);
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut header = [0; BLOCK_HEADER_SIZE];
        file.read_exact(&mut header)?;
        let mut cursor = SliceCursor::new(&header);
        let entry_count = cursor.get_u64()?;
        let byte_length = cursor.get_u64()?;
        let crc = cursor.get_u32()?;

        let end = self.offset + BLOCK_HEADER_SIZE as u64 + byte_length;
        if end > self.file_length {
            return Err(StorageError::Corruption(format!(
                "block at offset {} ends at {end}, beyond file length {}",
                self.offset, self.file_length
            )));
        }
        self.offset = end;

        let channel = ChecksumRead {
            inner: BufReader::new(file.take(byte_length)),
            hasher: Hasher::new(),
        };
        Ok(Some(BlockEntryReader {
            cursor: ChannelCursor::new(channel),
            key: self.layout.new_key(),
            value: self.layout.new_value(),
            layout: Arc::clone(&self.layout),
            remaining: entry_count,
            byte_length,
            crc,
            verified: false,
        }))
    }
}

impl<K, V> std::fmt::Debug for BlockReader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// Feeds every byte read through a CRC32 hasher.
struct ChecksumRead<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> Read for ChecksumRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Cursor over the entries of one block.
pub struct BlockEntryReader<K, V> {
    cursor: ChannelCursor<ChecksumRead<BufReader<Take<File>>>>,
    layout: SharedLayout<K, V>,
    key: K,
    value: V,
    remaining: u64,
    byte_length: u64,
    crc: u32,
    verified: bool,
}

impl<K, V> BlockEntryReader<K, V> {
    /// Entries not yet read.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    fn verify(&mut self) -> Result<(), StorageError> {
        if self.verified {
            return Ok(());
        }
        self.verified = true;
        if self.cursor.position() != self.byte_length {
            return Err(StorageError::Corruption(format!(
                "block entries span {} bytes, header says {}",
                self.cursor.position(),
                self.byte_length
            )));
        }
        let actual = self.cursor.channel_mut().hasher.clone().finalize();
        if actual != self.crc {
            return Err(StorageError::Corruption(format!(
                "block checksum mismatch: expected {:#010x}, found {actual:#010x}",
                self.crc
            )));
        }
        Ok(())
    }
}

impl<K: Send, V: Send> BlockEntryCursor<K, V> for BlockEntryReader<K, V> {
    fn next(&mut self) -> Result<bool, StorageError> {
        if self.remaining == 0 {
            self.verify()?;
            return Ok(false);
        }
        BlockEntry::read(
            &mut self.cursor,
            self.layout.as_ref(),
            &mut self.key,
            &mut self.value,
        )?;
        self.remaining -= 1;
        Ok(true)
    }

    fn key(&self) -> &K {
        &self.key
    }

    fn value(&self) -> &V {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::merge::{CloseCancellation, NeverCancelled};
    use crate::testing::{LongLayout, TestValue};

    fn storage(dir: &tempfile::TempDir, block_size: usize) -> BlockStorage<i64, TestValue> {
        BlockStorage::new(
            dir.path().join("part"),
            block_size,
            Arc::new(LongLayout),
            Arc::new(NoopMonitor),
        )
    }

    fn read_blocks(storage: &BlockStorage<i64, TestValue>) -> Vec<Vec<(i64, String)>> {
        let mut reader = storage.reader().expect("reader");
        let mut blocks = Vec::new();
        while let Some(mut block) = reader.next_block().expect("block") {
            let mut entries = Vec::new();
            while block.next().expect("entry") {
                entries.push((*block.key(), block.value().as_str().to_owned()));
            }
            blocks.push(entries);
        }
        blocks
    }

    #[test]
    fn test_blocks_are_sorted_and_bounded() {
        let dir = tempfile::tempdir().expect("temp dir");
        // each entry is 1 + 8 + 1 + 3 = 13 bytes: 4 per block
        let mut storage = storage(&dir, 52);
        for key in [9, 3, 7, 1, 8, 2, 6, 4, 5] {
            storage.add(&key, &TestValue::from("abc")).expect("add");
        }
        storage.done_adding().expect("done");

        assert_eq!(storage.count(), 9);
        assert_eq!(storage.number_of_blocks(), 3);
        let keys: Vec<Vec<i64>> = read_blocks(&storage)
            .into_iter()
            .map(|block| block.into_iter().map(|(k, _)| k).collect())
            .collect();
        assert_eq!(keys, vec![vec![1, 3, 7, 9], vec![2, 4, 6, 8], vec![5]]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 1024);
        for (key, value) in [(2, "x"), (1, "first"), (2, "y"), (1, "second")] {
            storage.add(&key, &TestValue::from(value)).expect("add");
        }
        storage.done_adding().expect("done");
        let blocks = read_blocks(&storage);
        let values: Vec<&str> = blocks[0].iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["first", "second", "x", "y"]);
    }

    #[test]
    fn test_merge_produces_single_sorted_block() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 100);
        let mut rng = StdRng::seed_from_u64(3);
        let mut expected: Vec<i64> = (0..500).map(|_| rng.random_range(-1000..1000)).collect();
        for key in &expected {
            storage.add(key, &TestValue::from("v")).expect("add");
        }
        storage.done_adding().expect("done");
        assert!(storage.number_of_blocks() > 16);

        storage.merge(4, &NeverCancelled).expect("merge");
        assert_eq!(storage.number_of_blocks(), 1);
        assert!(storage.entries_merged() >= 500);

        expected.sort_unstable();
        let blocks = read_blocks(&storage);
        assert_eq!(blocks.len(), 1);
        let keys: Vec<i64> = blocks[0].iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, expected);
        storage.close().expect("close");
    }

    #[test]
    fn test_empty_storage_has_no_blocks() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 100);
        storage.done_adding().expect("done");
        storage.merge(4, &NeverCancelled).expect("merge");
        assert!(read_blocks(&storage).is_empty());
        storage.close().expect("close");
    }

    #[test]
    fn test_cancelled_merge_returns_early() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 30);
        for key in 0..100 {
            storage.add(&key, &TestValue::from("v")).expect("add");
        }
        storage.done_adding().expect("done");
        let blocks = storage.number_of_blocks();

        let cancellation = CloseCancellation::new();
        cancellation.cancel();
        storage.merge(2, &cancellation).expect("cancelled merge");
        assert_eq!(storage.number_of_blocks(), blocks);
        storage.close().expect("close");
    }

    #[test]
    fn test_corrupt_block_is_detected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 1024);
        for key in 0..10 {
            storage.add(&key, &TestValue::from("value")).expect("add");
        }
        storage.done_adding().expect("done");

        // flip a byte inside the last value
        let mut bytes = std::fs::read(storage.path()).expect("read file");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(storage.path(), &bytes).expect("write file");

        let mut reader = storage.reader().expect("reader");
        let mut block = reader.next_block().expect("block").expect("one block");
        let mut result = Ok(true);
        while matches!(result, Ok(true)) {
            result = block.next();
        }
        assert!(matches!(result, Err(StorageError::Corruption(_))));
    }

    #[test]
    fn test_truncated_file_is_detected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut storage = storage(&dir, 1024);
        storage.add(&1, &TestValue::from("value")).expect("add");
        storage.done_adding().expect("done");

        let bytes = std::fs::read(storage.path()).expect("read file");
        std::fs::write(storage.path(), &bytes[..bytes.len() - 3]).expect("write file");
        let mut reader = storage.reader().expect("reader");
        assert!(matches!(reader.next_block(), Err(StorageError::Corruption(_))));
    }

    #[test]
    fn test_merge_passes() {
        assert_eq!(merge_passes(0, 4), 0);
        assert_eq!(merge_passes(1, 4), 0);
        assert_eq!(merge_passes(4, 4), 1);
        assert_eq!(merge_passes(5, 4), 2);
        assert_eq!(merge_passes(16, 4), 2);
        assert_eq!(merge_passes(17, 2), 5);
    }
}
