use crate::protocol::Endianness;

use super::{padding_to, Direction, IoBuf, ReadView};

#[test]
fn cursor_arithmetic() {
    let mut buf = IoBuf::with_capacity(16, Direction::Rx);
    assert_eq!(buf.capacity(), 16);
    assert_eq!(buf.available(), 0);
    assert_eq!(buf.space(), 16);
    assert_eq!(buf.consumed(), 0);

    buf.get_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
    buf.advance_mut(4);
    assert_eq!(buf.available(), 4);
    assert_eq!(buf.space(), 12);

    buf.advance(2);
    assert_eq!(buf.available(), 2);
    assert_eq!(buf.consumed(), 2);
    assert_eq!(buf.get(), &[3, 4]);

    buf.reset();
    assert_eq!(buf.available(), 0);
    assert_eq!(buf.space(), 16);
}

#[test]
fn rebase_compacts_unconsumed_bytes() {
    let mut buf = IoBuf::with_capacity(8, Direction::Rx);
    buf.get_mut()[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
    buf.advance_mut(6);
    buf.advance(4);

    buf.rebase();
    assert_eq!(buf.consumed(), 0);
    assert_eq!(buf.available(), 2);
    assert_eq!(buf.space(), 6);
    assert_eq!(buf.get(), &[5, 6]);
}

#[test]
fn store_is_resource_bounded() {
    let mut buf = IoBuf::with_capacity(8, Direction::Tx);
    assert!(buf.store(1u32).is_ok());
    assert!(buf.store(2u32).is_ok());
    assert!(buf.store(3u32).unwrap_err().is_resources());
}

#[test]
fn store_at_patches_in_place() {
    let mut buf = IoBuf::with_capacity(8, Direction::Tx);
    buf.store(0u32).unwrap();
    buf.store(7u32).unwrap();
    buf.store_at(0, 42u32);

    let mut view = ReadView::new(buf.get(), Endianness::NATIVE);
    assert_eq!(view.load::<u32>().unwrap(), 42);
    assert_eq!(view.load::<u32>().unwrap(), 7);
}

#[test]
fn read_view_alignment_uses_message_base() {
    // A view starting 4 bytes into the message must pad 4 more bytes before
    // an 8-aligned load.
    let data = [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
    let mut view = ReadView::with_base(&data, Endianness::LITTLE, 4);
    view.align(8).unwrap();
    assert_eq!(view.pos(), 4);
    assert_eq!(view.load::<u32>().unwrap(), 1);
}

#[test]
fn read_view_strings() {
    let mut buf = IoBuf::with_capacity(32, Direction::Tx);
    buf.store(7u32).unwrap();
    buf.extend_from_slice_nul(b"foo bar").unwrap();

    let mut view = ReadView::new(buf.get(), Endianness::NATIVE);
    assert_eq!(view.load_string().unwrap(), "foo bar");
    assert!(view.is_empty());
}

#[test]
fn read_view_rejects_missing_nul() {
    let data = 3u32.to_le_bytes();
    let data: Vec<u8> = data.iter().copied().chain(*b"abcX").collect();
    let mut view = ReadView::new(&data, Endianness::LITTLE);
    assert!(view.load_string().is_err());
}

#[test]
fn padding() {
    assert_eq!(padding_to(8, 0), 0);
    assert_eq!(padding_to(8, 1), 7);
    assert_eq!(padding_to(8, 8), 0);
    assert_eq!(padding_to(4, 6), 2);
    assert_eq!(padding_to(1, 3), 0);
}
