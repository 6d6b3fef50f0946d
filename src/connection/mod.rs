//! The connection: wire codec and message orchestration.
//!
//! A [`Connection`] owns one RX and one TX buffer, the object tables, the
//! reply pool and the serial counter. At most one message per direction is
//! open at a time; the open-message state carries the signature cursor that
//! drives typed marshaling and unmarshaling.

use std::time::{Duration, Instant};

use crate::buf::{Direction, IoBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::iface::introspect_node;
use crate::ident::ObjectTables;
use crate::msg::MsgInfo;
use crate::protocol::Endianness;
use crate::reply::{ReplyPool, DEFAULT_CAPACITY};
use crate::transport::Transport;
use crate::{Arg, bus, Object};

use self::walk::SigWalker;

mod marshal;
mod unmarshal;
mod walk;

#[cfg(test)]
mod tests;

/// Default capacity of each I/O buffer.
const DEFAULT_BUFFER: usize = 4096;

/// Default deadline for pending replies and mid-message refills.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An outbound message being built.
struct TxMsg {
    serial: u32,
    walker: SigWalker,
    /// Offset of the first body byte within the TX buffer.
    body_start: usize,
    /// Whether a reply slot was reserved and must be released on cancel.
    reply_alloc: bool,
}

enum TxPhase {
    /// Header staged, body being marshaled into the TX buffer.
    Building(TxMsg),
    /// Header and staged body sent; `remaining` raw body bytes still owed.
    Raw { remaining: usize },
}

/// An inbound message being consumed.
struct RxMsg {
    endianness: Endianness,
    body_len: usize,
    /// Body bytes consumed so far; doubles as the alignment base since the
    /// body starts on an 8-byte boundary of the message.
    consumed: usize,
    walker: SigWalker,
    /// Raw mode: signature tracking abandoned for bulk reads.
    raw: bool,
}

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    buffer: usize,
    replies: usize,
    timeout: Duration,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
            replies: DEFAULT_CAPACITY,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Capacity of the RX and TX buffers, fixed for the connection lifetime.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer = capacity;
        self
    }

    /// Number of concurrently pending method-call replies.
    pub fn reply_slots(mut self, slots: usize) -> Self {
        self.replies = slots;
        self
    }

    /// Default reply deadline, also used for mid-message refills.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Construct the connection over the given transport.
    pub fn connect<T>(self, transport: T) -> Connection<T>
    where
        T: Transport,
    {
        Connection {
            transport,
            rx: IoBuf::with_capacity(self.buffer, Direction::Rx),
            tx: IoBuf::with_capacity(self.buffer, Direction::Tx),
            tables: ObjectTables::new(bus::BUS_OBJECTS),
            replies: ReplyPool::new(self.replies),
            next_serial: 1,
            call_timeout: self.timeout,
            tx_msg: None,
            rx_msg: None,
        }
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A message-protocol connection over a byte transport.
pub struct Connection<T> {
    transport: T,
    rx: IoBuf,
    tx: IoBuf,
    tables: ObjectTables,
    replies: ReplyPool,
    next_serial: u32,
    call_timeout: Duration,
    tx_msg: Option<TxPhase>,
    rx_msg: Option<RxMsg>,
}

impl<T> Connection<T>
where
    T: Transport,
{
    /// Construct a connection with default configuration.
    pub fn new(transport: T) -> Self {
        ConnectionBuilder::new().connect(transport)
    }

    /// Get a builder for a configured connection.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Install the application object tables.
    ///
    /// The bus table is built in; `local` holds the objects this side
    /// implements and `proxy` the remote objects it calls.
    pub fn register_objects(&mut self, local: &'static [Object], proxy: &'static [Object]) {
        self.tables.register(local, proxy);
    }

    /// Reply to an identified `Introspect` call with the introspection
    /// document of the called object.
    pub fn introspect(&mut self, info: &MsgInfo) -> Result<()> {
        let Some(path) = info.path() else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        let doc = introspect_node(&self.tables, path);
        self.marshal_reply(info)?;
        self.marshal_args(&[Arg::Str(&doc)])?;
        self.deliver_msg()
    }

    /// Tear down connection state: pending replies, registered tables,
    /// buffers and any open message in either direction.
    pub fn disconnect(&mut self) {
        self.replies.clear();
        self.tables.clear();
        self.tx.reset();
        self.rx.reset();
        self.tx_msg = None;
        self.rx_msg = None;
    }

    fn next_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.checked_add(1).unwrap_or(1);
        serial
    }

    /// Block until at least `min` bytes are available in the RX buffer.
    ///
    /// Compacts the buffer before receiving, which invalidates borrowed
    /// values handed out earlier; callers re-derive their views afterwards.
    fn fill_rx(&mut self, min: usize, timeout: Duration) -> Result<()> {
        if self.rx.available() >= min {
            return Ok(());
        }

        if min > self.rx.capacity() {
            return Err(Error::new(ErrorKind::Resources));
        }

        self.rx.rebase();
        let deadline = Instant::now() + timeout;

        while self.rx.available() < min {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(Error::new(ErrorKind::Timeout));
            };

            let n = self.transport.recv(self.rx.get_mut(), remaining)?;
            self.rx.advance_mut(n);
        }

        Ok(())
    }
}
