//! Append-only log of discriminant-tagged records.
//!
//! # Design
//!
//! Records are encoded into a page-sized [`PageBuffer`] and the buffer is
//! appended to the file whenever the next record would not fit, so a record
//! never straddles two flushes. The file is only created once the first page
//! is flushed. [`SimpleEntryStorage::done_adding`] terminates the log with a
//! [`STOP`] byte; readers stop there.
//!
//! The storage has a single writer, and reading is only valid after
//! `done_adding`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::StorageError;
use super::cursor::{ChannelCursor, PageBuffer, ReadCursor, WriteCursor};

/// Terminates a log.
pub const STOP: u8 = 0xFF;

/// Page-buffered append-only record log backed by one temp file.
#[derive(Debug)]
pub struct SimpleEntryStorage {
    path: PathBuf,
    page: PageBuffer,
    file: Option<File>,
    count: u64,
    done: bool,
}

impl SimpleEntryStorage {
    /// Create a storage that spills to `path` through a buffer of
    /// `buffer_size` bytes.
    #[must_use]
    pub fn new(path: PathBuf, buffer_size: usize) -> Self {
        Self {
            path,
            page: PageBuffer::new(buffer_size),
            file: None,
            count: 0,
            done: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records added so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Reserve room for a record of `entry_size` bytes, discriminant
    /// included, and return the buffer to encode it into.
    pub fn prepare_write(&mut self, entry_size: usize) -> Result<&mut PageBuffer, StorageError> {
        if self.done {
            return Err(StorageError::Corruption(format!(
                "{} is already complete",
                self.path.display()
            )));
        }
        if entry_size > self.page.capacity() {
            return Err(StorageError::EntryTooLarge {
                size: entry_size,
                max: self.page.capacity(),
            });
        }
        if entry_size > self.page.remaining() {
            self.flush()?;
        }
        self.count += 1;
        Ok(&mut self.page)
    }

    /// Terminate the log and flush it to disk.
    pub fn done_adding(&mut self) -> Result<(), StorageError> {
        if self.done {
            return Ok(());
        }
        if self.count > 0 {
            if self.page.remaining() == 0 {
                self.flush()?;
            }
            self.page.put_u8(STOP);
            self.flush()?;
            if let Some(file) = self.file.as_mut() {
                file.flush()?;
            }
        }
        self.done = true;
        debug!(path = %self.path.display(), entries = self.count, "entry log complete");
        Ok(())
    }

    /// Read the records back in write order.
    pub fn reader(&self) -> Result<EntryReader, StorageError> {
        if !self.done {
            return Err(StorageError::Corruption(format!(
                "{} read before it was complete",
                self.path.display()
            )));
        }
        if self.count == 0 {
            return Ok(EntryReader { cursor: None });
        }
        let file = File::open(&self.path)?;
        Ok(EntryReader {
            cursor: Some(ChannelCursor::new(BufReader::new(file))),
        })
    }

    /// Delete the spill file.
    pub fn close(mut self) -> Result<(), StorageError> {
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.page.is_empty() {
            return Ok(());
        }
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?,
        };
        let file = self.file.insert(file);
        file.write_all(self.page.as_bytes())?;
        self.page.clear();
        Ok(())
    }
}

/// Forward-only reader over a completed log.
#[derive(Debug)]
pub struct EntryReader {
    cursor: Option<ChannelCursor<BufReader<File>>>,
}

impl EntryReader {
    /// Advance to the next record and return its discriminant together with
    /// the cursor positioned at its payload, or `None` at the end of the log.
    pub fn next_record(&mut self) -> Result<Option<(u8, &mut dyn ReadCursor)>, StorageError> {
        let discriminant = match self.cursor.as_mut() {
            Some(cursor) => cursor.get_u8()?,
            None => return Ok(None),
        };
        if discriminant == STOP {
            self.cursor = None;
            return Ok(None);
        }
        Ok(self
            .cursor
            .as_mut()
            .map(|cursor| (discriminant, cursor as &mut dyn ReadCursor)))
    }
}
