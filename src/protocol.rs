//! Low level details of the AllJoyn thin-client wire protocol.
//!
//! AllJoyn shares the D-Bus marshaling rules; the fixed header additionally
//! carries the header-section length so the whole variable section can be
//! sized before it is parsed.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};

use crate::frame::Frame;

/// The protocol major version understood by this implementation.
pub(crate) const VERSION: u8 = 1;

/// Upper bound on the variable header section of a single message.
pub(crate) const MAX_HEADER_LEN: u32 = 0xffff;

/// Upper bound on a declared message body.
pub(crate) const MAX_BODY_LEN: u32 = 0x0100_0000;

/// Upper bound on a declared array length.
pub(crate) const MAX_ARRAY_LEN: u32 = 0x0002_0000;

/// The fixed message header.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct Header {
    pub(crate) endianness: Endianness,
    pub(crate) msg_type: MsgType,
    pub(crate) flags: Flags,
    pub(crate) version: u8,
    pub(crate) body_len: u32,
    pub(crate) serial: u32,
    pub(crate) header_len: u32,
}

unsafe impl Frame for Header {
    fn adjust(&mut self, endianness: Endianness) {
        self.body_len.adjust(endianness);
        self.serial.adjust(endianness);
        self.header_len.adjust(endianness);
    }
}

macro_rules! raw_enum {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)*
                    _ => f.write_str("INVALID"),
                }
            }
        }
    }
}

macro_rules! raw_set {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Default, Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                struct Raw(&'static str);

                impl fmt::Debug for Raw {
                    #[inline]
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "{}", self.0)
                    }
                }

                let mut f = f.debug_set();

                let mut this = *self;

                $(
                    if this & Self::$variant {
                        f.entry(&Raw(stringify!($variant)));
                        this = this ^ Self::$variant;
                    }
                )*

                if this.0 != 0 {
                    f.entry(&this.0);
                }

                f.finish()
            }
        }
    }
}

raw_enum! {
    /// The endianness of a message.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian.
        LITTLE = b'l',
        /// Big endian.
        BIG = b'B',
    }
}

impl Endianness {
    /// Native endian.
    #[cfg(target_endian = "little")]
    pub(crate) const NATIVE: Self = Self::LITTLE;
    /// Native endian.
    #[cfg(target_endian = "big")]
    pub(crate) const NATIVE: Self = Self::BIG;
}

unsafe impl Frame for Endianness {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

raw_enum! {
    /// The type of a message.
    #[repr(u8)]
    pub enum MsgType {
        /// Not a valid message type.
        INVALID = 0,
        /// Method call. This message type may prompt a reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply. If the first argument exists and is a string, it is
        /// an error message.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

raw_set! {
    /// Flags inside of message header.
    ///
    /// # Examples
    ///
    /// ```
    /// use alljoyn_thin::Flags;
    ///
    /// let flags = Flags::EMPTY;
    /// assert!(!(flags & Flags::NO_REPLY_EXPECTED));
    ///
    /// let flags = Flags::EMPTY | Flags::NO_REPLY_EXPECTED;
    /// assert!(flags & Flags::NO_REPLY_EXPECTED);
    /// assert!(!(flags & Flags::ENCRYPTED));
    /// ```
    #[repr(u8)]
    pub enum Flags {
        /// An empty set of flags.
        EMPTY = 0x00,
        /// No method return or error reply is expected for this message.
        NO_REPLY_EXPECTED = 0x01,
        /// The bus may start a service to handle this message.
        AUTO_START = 0x02,
        /// Allow messages from remote attachments.
        ALLOW_REMOTE_MSG = 0x04,
        /// The signal is sent outside of any session.
        SESSIONLESS = 0x10,
        /// The signal is broadcast to every routing node.
        GLOBAL_BROADCAST = 0x20,
        /// The header of this message is compressed.
        COMPRESSED = 0x40,
        /// The body of this message is encrypted end-to-end.
        ENCRYPTED = 0x80,
    }
}

impl BitOr<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Flags) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd<Flags> for Flags {
    type Output = bool;

    #[inline]
    fn bitand(self, rhs: Flags) -> Self::Output {
        self.0 & rhs.0 != 0
    }
}

impl BitXor<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitxor(self, rhs: Flags) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

unsafe impl Frame for Flags {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

raw_enum! {
    /// A typed field in the variable header section.
    #[repr(u8)]
    pub(crate) enum FieldId {
        /// Not a valid field.
        INVALID = 0,
        /// The object to send a call to, or the object a signal is emitted
        /// from. Required for method calls and signals.
        PATH = 1,
        /// The interface to invoke a method call on, or that a signal is
        /// emitted from.
        INTERFACE = 2,
        /// The member, either the method name or signal name.
        MEMBER = 3,
        /// The name of the error that occurred, for errors.
        ERROR_NAME = 4,
        /// The serial number of the message this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// Unique name of the sending connection.
        SENDER = 7,
        /// The signature of the message body. If omitted, the body must be
        /// zero length.
        SIGNATURE = 8,
        /// The number of handles that accompany the message.
        HANDLES = 9,
        /// Timestamp at which the message was generated.
        TIMESTAMP = 0x10,
        /// Number of milliseconds the message is valid for after its
        /// timestamp.
        TIME_TO_LIVE = 0x11,
        /// Token for header compression.
        COMPRESSION_TOKEN = 0x12,
        /// The session the message belongs to.
        SESSION_ID = 0x13,
    }
}

unsafe impl Frame for FieldId {
    #[inline]
    fn adjust(&mut self, _: Endianness) {}
}

raw_enum! {
    /// A type code inside of a signature.
    #[repr(u8)]
    pub(crate) enum TypeId {
        /// Not a valid type code, used to terminate signatures.
        INVALID = b'\0',
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean value carried as a 32-bit word, 0 is FALSE and 1 is TRUE.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double.
        DOUBLE = b'd',
        /// UTF-8 string, NUL terminated on the wire.
        STRING = b's',
        /// Name of an object instance.
        OBJECT_PATH = b'o',
        /// A type signature, byte-length prefixed.
        SIGNATURE = b'g',
        /// Array, length prefixed.
        ARRAY = b'a',
        /// Variant type: the type of the value is part of the value itself.
        VARIANT = b'v',
        /// Socket handle carried as a 32-bit index.
        HANDLE = b'h',
        OPEN_PAREN = b'(',
        CLOSE_PAREN = b')',
        OPEN_BRACE = b'{',
        CLOSE_BRACE = b'}',
    }
}

impl TypeId {
    /// Wire alignment of the type.
    pub(crate) fn alignment(self) -> usize {
        match self {
            TypeId::BYTE | TypeId::SIGNATURE | TypeId::VARIANT => 1,
            TypeId::INT16 | TypeId::UINT16 => 2,
            TypeId::BOOLEAN
            | TypeId::INT32
            | TypeId::UINT32
            | TypeId::HANDLE
            | TypeId::STRING
            | TypeId::OBJECT_PATH
            | TypeId::ARRAY => 4,
            TypeId::INT64
            | TypeId::UINT64
            | TypeId::DOUBLE
            | TypeId::OPEN_PAREN
            | TypeId::OPEN_BRACE => 8,
            _ => 1,
        }
    }

    /// Test if the type is a basic (non-container) type.
    pub(crate) fn is_basic(self) -> bool {
        matches!(
            self,
            TypeId::BYTE
                | TypeId::BOOLEAN
                | TypeId::INT16
                | TypeId::UINT16
                | TypeId::INT32
                | TypeId::UINT32
                | TypeId::INT64
                | TypeId::UINT64
                | TypeId::DOUBLE
                | TypeId::STRING
                | TypeId::OBJECT_PATH
                | TypeId::SIGNATURE
                | TypeId::HANDLE
        )
    }
}
