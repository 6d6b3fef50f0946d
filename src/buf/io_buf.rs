use std::fmt;
use std::mem::size_of;

use crate::buf::padding_to;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::Frame;

/// The direction of an [`IoBuf`], fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Buffer holds bytes received from the transport.
    Rx,
    /// Buffer stages bytes to be sent through the transport.
    Tx,
}

/// A fixed-capacity byte buffer with independent read and write cursors.
///
/// The capacity is allocated once at connection setup and never grows;
/// staging more bytes than fit is a [`Resources`] error rather than a
/// reallocation. The invariant `read <= written <= capacity` holds by
/// construction.
///
/// Outbound frames are always stored in native endianness; the endianness
/// tag in the message header tells the peer how to adjust.
///
/// [`Resources`]: crate::Error::is_resources
pub struct IoBuf {
    data: Box<[u8]>,
    /// Read cursor: everything before it has been consumed.
    read: usize,
    /// Write cursor: everything before it has been produced.
    written: usize,
    direction: Direction,
}

impl IoBuf {
    /// Construct a buffer with the given fixed capacity.
    pub fn with_capacity(capacity: usize, direction: Direction) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            read: 0,
            written: 0,
            direction,
        }
    }

    /// The direction the buffer was created with.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Total capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes produced but not yet consumed.
    #[inline]
    pub fn available(&self) -> usize {
        self.written - self.read
    }

    /// Bytes that can still be produced before the buffer is full.
    #[inline]
    pub fn space(&self) -> usize {
        self.data.len() - self.written
    }

    /// Bytes consumed since the last reset or rebase.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.read
    }

    /// Reset both cursors to the start.
    ///
    /// Only meaningful once the buffer has been fully drained; any
    /// unconsumed bytes are discarded.
    pub fn reset(&mut self) {
        self.read = 0;
        self.written = 0;
    }

    /// Compact unconsumed bytes to the front of the buffer.
    ///
    /// Used before a new unmarshal pass so a message spanning buffer refills
    /// doesn't lose data already received.
    pub fn rebase(&mut self) {
        if self.read == 0 {
            return;
        }

        self.data.copy_within(self.read..self.written, 0);
        self.written -= self.read;
        self.read = 0;
    }

    /// Get the unconsumed region.
    #[inline]
    pub fn get(&self) -> &[u8] {
        &self.data[self.read..self.written]
    }

    /// Get the last `n` consumed bytes.
    ///
    /// Valid until the next rebase; used to hand out borrowed values after
    /// their bytes have already been accounted as consumed.
    #[inline]
    pub(crate) fn taken(&self, n: usize) -> &[u8] {
        &self.data[self.read - n..self.read]
    }

    /// Get the writable region.
    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.written..]
    }

    /// Indicate that `n` bytes have been consumed.
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.read + n <= self.written);
        self.read += n;
    }

    /// Indicate that `n` bytes have been produced.
    #[inline]
    pub(crate) fn advance_mut(&mut self, n: usize) {
        debug_assert!(self.written + n <= self.data.len());
        self.written += n;
    }

    /// Current write position measured from the start of the buffer.
    ///
    /// Marshaled messages always begin at position zero, so this doubles as
    /// the offset within the message being staged.
    #[inline]
    pub(crate) fn write_pos(&self) -> usize {
        self.written
    }

    /// Zero-pad the write cursor to the given alignment, relative to the
    /// start of the buffer.
    pub(crate) fn align_mut(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(align, self.written);

        if padding > self.space() {
            return Err(Error::new(ErrorKind::Resources));
        }

        self.data[self.written..self.written + padding].fill(0);
        self.written += padding;
        Ok(())
    }

    /// Store a frame at the aligned write cursor in native endianness.
    pub(crate) fn store<T>(&mut self, frame: T) -> Result<()>
    where
        T: Frame,
    {
        self.align_mut(std::mem::align_of::<T>())?;

        if size_of::<T>() > self.space() {
            return Err(Error::new(ErrorKind::Resources));
        }

        // SAFETY: Bounds were checked above; the write is unaligned-safe.
        unsafe {
            let at = self.data.as_mut_ptr().add(self.written).cast::<T>();
            at.write_unaligned(frame);
        }

        self.written += size_of::<T>();
        Ok(())
    }

    /// Overwrite a frame previously stored at `at` without moving the write
    /// cursor. Used to patch length fields once their value is known.
    pub(crate) fn store_at<T>(&mut self, at: usize, frame: T)
    where
        T: Frame,
    {
        assert!(at + size_of::<T>() <= self.written, "patch out of bounds");

        // SAFETY: Bounds were asserted above.
        unsafe {
            let at = self.data.as_mut_ptr().add(at).cast::<T>();
            at.write_unaligned(frame);
        }
    }

    /// Append a byte slice.
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.space() {
            return Err(Error::new(ErrorKind::Resources));
        }

        self.data[self.written..self.written + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        Ok(())
    }

    /// Append a byte slice followed by a NUL byte.
    pub(crate) fn extend_from_slice_nul(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() + 1 > self.space() {
            return Err(Error::new(ErrorKind::Resources));
        }

        self.data[self.written..self.written + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        self.data[self.written] = 0;
        self.written += 1;
        Ok(())
    }
}

impl fmt::Debug for IoBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuf")
            .field("direction", &self.direction)
            .field("capacity", &self.data.len())
            .field("read", &self.read)
            .field("written", &self.written)
            .finish()
    }
}
