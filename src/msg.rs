use crate::protocol::{Flags, MsgType};
use crate::{MsgId, SignatureBuf};

/// The kind of a message, keyed on the wire message type.
///
/// The wire header stores the call fields and the reply fields in the same
/// slots; modeling them as a tagged union makes reading the wrong field for
/// a given message type impossible.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MsgKind {
    /// Method call. This message type may prompt a reply.
    MethodCall {
        /// The object path being called.
        path: Box<str>,
        /// The member being called.
        member: Box<str>,
    },
    /// Method reply with returned data.
    MethodReturn {
        /// The serial this is a reply to.
        reply_serial: u32,
    },
    /// Error reply. If the first argument exists and is a string, it is an
    /// error message.
    Error {
        /// The name of the error.
        error_name: Box<str>,
        /// The serial this is a reply to.
        reply_serial: u32,
    },
    /// Signal emission.
    Signal {
        /// The object path the signal is emitted from.
        path: Box<str>,
        /// The member being signalled.
        member: Box<str>,
    },
}

impl MsgKind {
    pub(crate) fn msg_type(&self) -> MsgType {
        match self {
            MsgKind::MethodCall { .. } => MsgType::METHOD_CALL,
            MsgKind::MethodReturn { .. } => MsgType::METHOD_RETURN,
            MsgKind::Error { .. } => MsgType::ERROR,
            MsgKind::Signal { .. } => MsgType::SIGNAL,
        }
    }
}

/// Metadata for a message, parsed out of the header section on unmarshal or
/// recorded while a message is being marshaled.
///
/// Body arguments are not part of this structure; they are consumed through
/// the connection arg-by-arg while the info is held.
#[derive(Debug, Clone, PartialEq)]
pub struct MsgInfo {
    /// The kind of the message.
    pub kind: MsgKind,
    /// Serial number of the message.
    pub serial: u32,
    /// Flags of the message.
    pub flags: Flags,
    /// The interface of the message, if any.
    pub interface: Option<Box<str>>,
    /// The destination of the message, if any.
    pub destination: Option<Box<str>>,
    /// The sender of the message, if any.
    pub sender: Option<Box<str>>,
    /// The signature of the body.
    pub signature: SignatureBuf,
    /// The session the message belongs to, zero when sessionless.
    pub session_id: u32,
    /// Timestamp header field, if present.
    pub timestamp: Option<u32>,
    /// Time-to-live in milliseconds, if present.
    pub ttl: Option<u32>,
    /// Declared body length in bytes.
    pub body_len: u32,
    /// The resolved message identifier, or `None` while unidentified.
    pub msg_id: Option<MsgId>,
}

impl MsgInfo {
    pub(crate) fn new(kind: MsgKind, serial: u32) -> Self {
        Self {
            kind,
            serial,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            signature: SignatureBuf::empty(),
            session_id: 0,
            timestamp: None,
            ttl: None,
            body_len: 0,
            msg_id: None,
        }
    }

    /// Get the reply serial if this is a method return or error.
    pub fn reply_serial(&self) -> Option<u32> {
        match &self.kind {
            MsgKind::MethodReturn { reply_serial } => Some(*reply_serial),
            MsgKind::Error { reply_serial, .. } => Some(*reply_serial),
            _ => None,
        }
    }

    /// Get the member name if this is a method call or signal.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MsgKind::MethodCall { member, .. } => Some(member),
            MsgKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// Get the object path if this is a method call or signal.
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            MsgKind::MethodCall { path, .. } => Some(path),
            MsgKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Get the error name if this is an error reply.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MsgKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }
}
