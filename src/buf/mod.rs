//! Fixed-capacity I/O buffers and borrowed read views.

pub use self::io_buf::{Direction, IoBuf};
mod io_buf;

pub use self::read_view::ReadView;
mod read_view;

#[cfg(test)]
mod tests;

/// Calculate padding to the given alignment, which must be a power of two.
#[inline(always)]
pub(crate) fn padding_to(align: usize, len: usize) -> usize {
    let mask = align - 1;
    (align - (len & mask)) & mask
}
