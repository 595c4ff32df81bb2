//! Single-threaded k-way merge of sorted cursors.

use std::cmp::Ordering;

use super::cursor::BlockEntryCursor;
use crate::key::Layout;
use crate::storage::StorageError;

/// Merges sorted sources into one sorted stream.
///
/// Each step picks the smallest current head by a linear scan. On equal keys
/// the source with the lowest index wins, which keeps the output
/// deterministic for a given input order. A source is only advanced when the
/// merged stream moves past the entry it provided.
pub struct MergingBlockEntryReader<'a, K, V, C> {
    layout: &'a dyn Layout<K, V>,
    sources: &'a mut [C],
    has_entry: Vec<bool>,
    current: Option<usize>,
    started: bool,
}

impl<'a, K, V, C: BlockEntryCursor<K, V>> MergingBlockEntryReader<'a, K, V, C> {
    pub fn new(layout: &'a dyn Layout<K, V>, sources: &'a mut [C]) -> Self {
        let has_entry = vec![false; sources.len()];
        Self {
            layout,
            sources,
            has_entry,
            current: None,
            started: false,
        }
    }

    /// Advance to the next smallest entry.
    pub fn next(&mut self) -> Result<bool, StorageError> {
        if self.started {
            if let Some(index) = self.current {
                self.has_entry[index] = self.sources[index].next()?;
            }
        } else {
            for (source, has_entry) in self.sources.iter_mut().zip(&mut self.has_entry) {
                *has_entry = source.next()?;
            }
            self.started = true;
        }

        let mut smallest: Option<usize> = None;
        for (index, source) in self.sources.iter().enumerate() {
            if !self.has_entry[index] {
                continue;
            }
            smallest = match smallest {
                Some(best)
                    if self.layout.compare(source.key(), self.sources[best].key())
                        != Ordering::Less =>
                {
                    Some(best)
                }
                _ => Some(index),
            };
        }
        self.current = smallest;
        Ok(smallest.is_some())
    }

    /// Key of the current entry.
    ///
    /// # Panics
    ///
    /// Panics if the last call to `next` did not return `true`.
    #[must_use]
    pub fn key(&self) -> &K {
        self.current_cursor().key()
    }

    /// Value of the current entry.
    ///
    /// # Panics
    ///
    /// Panics if the last call to `next` did not return `true`.
    #[must_use]
    pub fn value(&self) -> &V {
        self.current_cursor().value()
    }

    #[allow(clippy::expect_used)] // documented precondition of key() and value()
    fn current_cursor(&self) -> &C {
        let index = self.current.expect("no current entry");
        &self.sources[index]
    }

    /// Close every source, reporting the first failure.
    pub fn close(&mut self) -> Result<(), StorageError> {
        close_all::<K, V, C>(self.sources)
    }
}

/// Close every cursor even if some fail; return the first error.
pub fn close_all<K, V, C: BlockEntryCursor<K, V>>(cursors: &mut [C]) -> Result<(), StorageError> {
    let mut first_error = None;
    for cursor in cursors {
        if let Err(e) = cursor.close() {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
