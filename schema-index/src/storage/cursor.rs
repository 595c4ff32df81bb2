//! Byte cursors used by every codec in the crate.
//!
//! Keys, values and entries are written through a [`WriteCursor`] and read
//! back through a [`ReadCursor`]. Writers append; readers consume forward only.
//! All multi-byte integers are little-endian.
//!
//! - [`PageBuffer`]: page-sized in-memory write buffer, flushed by the entry
//!   storages when full.
//! - [`SliceCursor`]: reads an in-memory byte slice.
//! - [`ChannelCursor`]: reads a buffered byte stream such as a temp file.

use std::io::Read;

/// Default size of an I/O page (8KB).
pub const PAGE_SIZE: usize = 8192;

/// Forward-only reader of encoded data.
pub trait ReadCursor {
    /// Fill `dst` with the next `dst.len()` bytes.
    fn get_bytes(&mut self, dst: &mut [u8]) -> Result<(), CursorError>;

    /// Read a u8.
    fn get_u8(&mut self) -> Result<u8, CursorError> {
        let mut buf = [0u8; 1];
        self.get_bytes(&mut buf)?;
        Ok(buf[0])
    }

    /// Read an i8.
    fn get_i8(&mut self) -> Result<i8, CursorError> {
        let mut buf = [0u8; 1];
        self.get_bytes(&mut buf)?;
        Ok(i8::from_le_bytes(buf))
    }

    /// Read a u16 (little-endian).
    fn get_u16(&mut self) -> Result<u16, CursorError> {
        let mut buf = [0u8; 2];
        self.get_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read an i16 (little-endian).
    fn get_i16(&mut self) -> Result<i16, CursorError> {
        let mut buf = [0u8; 2];
        self.get_bytes(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Read an i32 (little-endian).
    fn get_i32(&mut self) -> Result<i32, CursorError> {
        let mut buf = [0u8; 4];
        self.get_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Read a u32 (little-endian).
    fn get_u32(&mut self) -> Result<u32, CursorError> {
        let mut buf = [0u8; 4];
        self.get_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read an i64 (little-endian).
    fn get_i64(&mut self) -> Result<i64, CursorError> {
        let mut buf = [0u8; 8];
        self.get_bytes(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Read a u64 (little-endian).
    fn get_u64(&mut self) -> Result<u64, CursorError> {
        let mut buf = [0u8; 8];
        self.get_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Append-only writer of encoded data.
pub trait WriteCursor {
    /// Append raw bytes.
    fn put_bytes(&mut self, src: &[u8]);

    /// Write a u8.
    fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    /// Write an i8.
    fn put_i8(&mut self, value: i8) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write a u16 (little-endian).
    fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write an i16 (little-endian).
    fn put_i16(&mut self, value: i16) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write an i32 (little-endian).
    fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write a u32 (little-endian).
    fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write an i64 (little-endian).
    fn put_i64(&mut self, value: i64) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }
}

impl WriteCursor for Vec<u8> {
    fn put_bytes(&mut self, src: &[u8]) {
        self.extend_from_slice(src);
    }
}

/// A fixed-capacity write buffer.
///
/// The capacity is a budget, not a hard limit: callers check
/// [`remaining`](Self::remaining) before writing an entry and flush when it
/// would not fit, so an entry never straddles two flushes.
pub struct PageBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl PageBuffer {
    /// Create an empty buffer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Capacity of the buffer in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written since the last clear.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written since the last clear.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that still fit within the capacity.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Get the written bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Forget all written bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl WriteCursor for PageBuffer {
    fn put_bytes(&mut self, src: &[u8]) {
        self.data.extend_from_slice(src);
    }
}

impl std::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Reads an in-memory byte slice.
#[derive(Debug)]
pub struct SliceCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> SliceCursor<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read offset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

impl ReadCursor for SliceCursor<'_> {
    fn get_bytes(&mut self, dst: &mut [u8]) -> Result<(), CursorError> {
        if dst.len() > self.remaining() {
            return Err(CursorError::OutOfBounds {
                offset: self.offset as u64,
                needed: dst.len(),
            });
        }
        dst.copy_from_slice(&self.data[self.offset..self.offset + dst.len()]);
        self.offset += dst.len();
        Ok(())
    }
}

/// Reads a byte stream, tracking how many bytes were consumed.
///
/// Running out of input is reported as [`CursorError::OutOfBounds`].
#[derive(Debug)]
pub struct ChannelCursor<R> {
    channel: R,
    position: u64,
}

impl<R: Read> ChannelCursor<R> {
    #[must_use]
    pub const fn new(channel: R) -> Self {
        Self {
            channel,
            position: 0,
        }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Get mutable access to the underlying channel.
    pub const fn channel_mut(&mut self) -> &mut R {
        &mut self.channel
    }
}

impl<R: Read> ReadCursor for ChannelCursor<R> {
    fn get_bytes(&mut self, dst: &mut [u8]) -> Result<(), CursorError> {
        match self.channel.read_exact(dst) {
            Ok(()) => {
                self.position += dst.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(CursorError::OutOfBounds {
                    offset: self.position,
                    needed: dst.len(),
                })
            }
            Err(e) => Err(CursorError::Io(e)),
        }
    }
}

/// Errors related to cursor operations.
#[derive(Debug)]
pub enum CursorError {
    /// Read past the end of the data.
    OutOfBounds { offset: u64, needed: usize },
    /// I/O error from the underlying channel.
    Io(std::io::Error),
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBounds { offset, needed } => {
                write!(f, "read of {needed} bytes at offset {offset} is out of bounds")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::OutOfBounds { .. } => None,
        }
    }
}

impl From<std::io::Error> for CursorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
