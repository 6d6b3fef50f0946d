use std::fmt;
use std::mem::size_of;
use std::str::from_utf8;

use crate::buf::padding_to;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::Frame;
use crate::protocol::Endianness;

/// A borrowed, endianness-aware view into received bytes.
///
/// Values decoded out of the view borrow from it, so a decoded `&str` cannot
/// outlive the buffer region it was read from. Alignment is computed against
/// `base + pos`, where `base` is the offset of the view within the message
/// it belongs to; wire padding is relative to the start of the message, not
/// the buffer.
pub struct ReadView<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    endianness: Endianness,
}

impl<'a> ReadView<'a> {
    /// Construct a view whose start coincides with an 8-byte boundary of the
    /// message.
    pub(crate) fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Self::with_base(data, endianness, 0)
    }

    /// Construct a view that begins `base` bytes into the enclosing
    /// message section.
    pub(crate) fn with_base(data: &'a [u8], endianness: Endianness, base: usize) -> Self {
        Self {
            data,
            pos: 0,
            base,
            endianness,
        }
    }

    /// Get the endianness of the view.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Number of bytes consumed so far.
    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes remaining in the view.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Test if the view has been exhausted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Skip padding up to the given alignment.
    pub(crate) fn align(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(align, self.base + self.pos);

        if self.pos + padding > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        self.pos += padding;
        Ok(())
    }

    /// Load a fixed-width frame, aligned per its wire alignment and adjusted
    /// for the endianness of the view.
    pub(crate) fn load<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        self.align(std::mem::align_of::<T>())?;

        if self.pos + size_of::<T>() > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        // SAFETY: Bounds were checked above.
        let mut frame =
            unsafe { self.data.as_ptr().add(self.pos).cast::<T>().read_unaligned() };

        self.pos += size_of::<T>();
        frame.adjust(self.endianness);
        Ok(frame)
    }

    /// Load a raw slice of `len` bytes.
    pub(crate) fn load_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Load a slice of `len` bytes followed by a NUL byte, excluding the NUL.
    pub(crate) fn load_slice_nul(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len + 1 > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        if self.data[self.pos + len] != 0 {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len + 1;
        Ok(slice)
    }

    /// Load a length-prefixed, NUL-terminated string.
    pub(crate) fn load_string(&mut self) -> Result<&'a str> {
        let len = self.load::<u32>()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(from_utf8(bytes)?)
    }

    /// Load a byte-length-prefixed signature string.
    pub(crate) fn load_signature_str(&mut self) -> Result<&'a str> {
        let len = self.load::<u8>()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(from_utf8(bytes)?)
    }
}

impl fmt::Debug for ReadView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadView")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("base", &self.base)
            .field("endianness", &self.endianness)
            .finish()
    }
}
