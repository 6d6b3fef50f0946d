use std::fmt;

use crate::protocol::TypeId;
use crate::Signature;

/// A single typed value being marshaled or unmarshaled.
///
/// String-like and byte-array variants borrow their contents: on unmarshal
/// they point straight into the receive buffer and are only valid until the
/// next unmarshal call on the connection, which the borrow checker enforces.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum Arg<'a> {
    /// 8-bit unsigned integer (`y`).
    Byte(u8),
    /// Boolean (`b`), carried as a 32-bit word on the wire.
    Bool(bool),
    /// 16-bit signed integer (`n`).
    Int16(i16),
    /// 16-bit unsigned integer (`q`).
    Uint16(u16),
    /// 32-bit signed integer (`i`).
    Int32(i32),
    /// 32-bit unsigned integer (`u`).
    Uint32(u32),
    /// 64-bit signed integer (`x`).
    Int64(i64),
    /// 64-bit unsigned integer (`t`).
    Uint64(u64),
    /// IEEE 754 double (`d`).
    Double(f64),
    /// Socket handle index (`h`).
    Handle(u32),
    /// UTF-8 string (`s`).
    Str(&'a str),
    /// Object path (`o`).
    ObjectPath(&'a str),
    /// Type signature (`g`).
    Sig(&'a Signature),
    /// Whole byte array (`ay`), marshaled without container calls.
    ByteArray(&'a [u8]),
}

impl Arg<'_> {
    /// The signature type code of the value.
    pub(crate) fn type_id(&self) -> TypeId {
        match self {
            Arg::Byte(..) => TypeId::BYTE,
            Arg::Bool(..) => TypeId::BOOLEAN,
            Arg::Int16(..) => TypeId::INT16,
            Arg::Uint16(..) => TypeId::UINT16,
            Arg::Int32(..) => TypeId::INT32,
            Arg::Uint32(..) => TypeId::UINT32,
            Arg::Int64(..) => TypeId::INT64,
            Arg::Uint64(..) => TypeId::UINT64,
            Arg::Double(..) => TypeId::DOUBLE,
            Arg::Handle(..) => TypeId::HANDLE,
            Arg::Str(..) => TypeId::STRING,
            Arg::ObjectPath(..) => TypeId::OBJECT_PATH,
            Arg::Sig(..) => TypeId::SIGNATURE,
            Arg::ByteArray(..) => TypeId::ARRAY,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Arg<'_> {
                #[inline]
                fn from(value: $ty) -> Self {
                    Arg::$variant(value)
                }
            }
        )*
    }
}

impl_from! {
    u8 => Byte,
    bool => Bool,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
}

impl<'a> From<&'a str> for Arg<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        Arg::Str(value)
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    #[inline]
    fn from(value: &'a [u8]) -> Self {
        Arg::ByteArray(value)
    }
}

impl<'a> From<&'a Signature> for Arg<'a> {
    #[inline]
    fn from(value: &'a Signature) -> Self {
        Arg::Sig(value)
    }
}

/// The kind of container being opened or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A struct (`(...)`), padded to 8 bytes before its first member.
    Struct,
    /// An array (`a`), length-prefixed and padded for its element type.
    Array,
    /// A dict entry (`{kv}`), only valid as the element of an array.
    DictEntry,
}

/// A token identifying an open container.
///
/// Returned by the container open operations and consumed by the matching
/// close; the token records the nesting depth the container was opened at so
/// an out-of-order close is rejected instead of corrupting the wire state.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub(crate) kind: ContainerKind,
    pub(crate) depth: usize,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .finish()
    }
}
