//! An embedded-style client stack for the AllJoyn thin-client message
//! protocol.
//!
//! This crate implements the message wire-protocol engine: marshaling and
//! unmarshaling of typed method calls, replies, errors and signals over a
//! byte-oriented transport, together with the compact interface-description
//! machinery that resolves incoming messages to packed 32-bit message
//! identifiers and correlates method-call replies with bounded, pooled reply
//! contexts.
//!
//! The stack is synchronous and single-threaded: the only blocking points are
//! the transport `send`/`recv` calls, each bounded by a caller-supplied
//! timeout.

#[macro_use]
mod stack;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::protocol::{Endianness, Flags, MsgType};
pub mod protocol;

mod frame;

#[doc(inline)]
pub use self::signature::{Signature, SignatureBuf, SignatureError};
mod signature;

pub use self::buf::{Direction, IoBuf, ReadView};
pub mod buf;

#[doc(inline)]
pub use self::transport::{MemTransport, Transport};
mod transport;

#[doc(inline)]
pub use self::arg::{Arg, Container, ContainerKind};
mod arg;

pub use self::msg::{MsgInfo, MsgKind};
mod msg;

#[doc(inline)]
pub use self::iface::{ArgDirection, InterfaceDesc, MemberKind, PropAccess, PropOp};
pub mod iface;

#[doc(inline)]
pub use self::ident::{MsgId, Object, ObjectTables, Table};
mod ident;

mod reply;

pub mod bus;

#[doc(inline)]
pub use self::connection::{Connection, ConnectionBuilder};
mod connection;
