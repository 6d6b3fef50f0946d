use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Test if the error is the end-of-container marker.
    ///
    /// `NoMore` is not a failure: it is how an array-reading loop learns that
    /// the container has been exhausted and the matching close can be issued.
    ///
    /// # Examples
    ///
    /// ```
    /// use alljoyn_thin::{Connection, ContainerKind, MemTransport, Result};
    ///
    /// fn drain(c: &mut Connection<MemTransport>) -> Result<u32> {
    ///     let array = c.unmarshal_container(ContainerKind::Array)?;
    ///     let mut n = 0;
    ///
    ///     loop {
    ///         match c.unmarshal_arg() {
    ///             Ok(..) => n += 1,
    ///             Err(e) if e.is_no_more() => break,
    ///             Err(e) => return Err(e),
    ///         }
    ///     }
    ///
    ///     c.unmarshal_close_container(array)?;
    ///     Ok(n)
    /// }
    /// ```
    #[inline]
    pub fn is_no_more(&self) -> bool {
        matches!(self.kind, ErrorKind::NoMore)
    }

    /// Test if the error indicates that the transport deadline elapsed
    /// without data.
    ///
    /// A timeout is recoverable: the caller is expected to perform idle-time
    /// work and retry.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Test if the error indicates buffer or pool exhaustion.
    #[inline]
    pub fn is_resources(&self) -> bool {
        matches!(self.kind, ErrorKind::Resources)
    }

    /// Test if more wire bytes are needed than are currently buffered.
    #[inline]
    pub(crate) fn is_buffer_underflow(&self) -> bool {
        matches!(self.kind, ErrorKind::BufferUnderflow)
    }

    /// Test if the error indicates a signature mismatch.
    #[inline]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::SignatureMismatch | ErrorKind::Signature(..)
        )
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::new(ErrorKind::Timeout)
            }
            _ => Self::new(ErrorKind::Io(error)),
        }
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::Timeout => write!(f, "Timed out"),
            ErrorKind::NoMore => write!(f, "No more elements in container"),
            ErrorKind::Resources => write!(f, "Out of buffer or pool resources"),
            ErrorKind::Marshal => write!(f, "Inconsistent marshal state"),
            ErrorKind::Unmarshal => write!(f, "Malformed wire data"),
            ErrorKind::SignatureMismatch => write!(f, "Signature mismatch"),
            ErrorKind::NoMatch => write!(f, "No matching registered member"),
            ErrorKind::Disallowed => write!(f, "Access to member is disallowed"),
            ErrorKind::Invalid => write!(f, "Invalid argument or identifier"),
            ErrorKind::Unexpected => write!(f, "Operation out of sequence"),
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::InvalidEndianness(b) => {
                write!(f, "Invalid endianness marker {b:#x}")
            }
            ErrorKind::InvalidProtocolVersion(v) => {
                write!(f, "Unsupported protocol version {v}")
            }
            ErrorKind::InvalidMessageType(t) => {
                write!(f, "Invalid message type {t}")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero serial in header"),
            ErrorKind::HeaderTooLong(len) => {
                write!(f, "Header section of {len} bytes exceeds buffer capacity")
            }
            ErrorKind::BodyTooLong(len) => {
                write!(f, "Body of length {len} is too long")
            }
            ErrorKind::ArrayTooLong(len) => {
                write!(f, "Array of length {len} is too long")
            }
            ErrorKind::MissingHeaderField(name) => {
                write!(f, "Missing required {name} header field")
            }
            ErrorKind::ConnectionClosed => write!(f, "Connection closed by peer"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    /// Underlying transport failure. Generally fatal to the connection.
    Io(io::Error),
    /// Invalid signature string.
    Signature(SignatureError),
    /// Decoded string was not valid UTF-8.
    Utf8Error(Utf8Error),
    /// No bytes arrived within the deadline.
    Timeout,
    /// End of container iteration.
    NoMore,
    /// Buffer or pool exhaustion.
    Resources,
    /// Inconsistent outbound message state, such as a declared body length
    /// that disagrees with the bytes actually produced.
    Marshal,
    /// Malformed or inconsistent inbound wire data.
    Unmarshal,
    /// An argument or on-wire signature disagrees with the declared member
    /// signature.
    SignatureMismatch,
    /// Identification found no registered member.
    NoMatch,
    /// Property access rights forbid the requested operation.
    Disallowed,
    /// A message id or argument is out of range for the registered tables.
    Invalid,
    /// Programming-contract violation, such as a mismatched container close.
    Unexpected,
    BufferUnderflow,
    NotNullTerminated,
    InvalidEndianness(u8),
    InvalidProtocolVersion(u8),
    InvalidMessageType(u8),
    ZeroSerial,
    HeaderTooLong(u32),
    BodyTooLong(u32),
    ArrayTooLong(u32),
    MissingHeaderField(&'static str),
    ConnectionClosed,
}
