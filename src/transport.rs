use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

/// The byte-transport boundary of a connection.
///
/// Implementations wrap whatever actually moves bytes (TCP, UDP, serial);
/// everything above this trait is buffer arithmetic. Both operations are
/// blocking, with `recv` bounded by an explicit timeout.
pub trait Transport {
    /// Send all of `bytes` through the transport.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive up to `buf.len()` bytes, blocking for at most `timeout`.
    ///
    /// Returns the number of bytes received, which is never zero: an elapsed
    /// deadline is a [`Timeout`] error and a peer that went away is an error
    /// as well.
    ///
    /// [`Timeout`]: Error::is_timeout
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<T> Transport for &mut T
where
    T: ?Sized + Transport,
{
    #[inline]
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    #[inline]
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).recv(buf, timeout)
    }
}

/// An in-memory transport for tests and demos.
///
/// [`MemTransport::pair`] returns two connected endpoints: bytes sent on one
/// side become receivable on the other. Since the stack is single-threaded,
/// an empty inbound queue reports [`Timeout`] immediately instead of
/// blocking.
///
/// [`Timeout`]: Error::is_timeout
pub struct MemTransport {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<VecDeque<u8>>>,
    local_closed: Rc<RefCell<bool>>,
    remote_closed: Rc<RefCell<bool>>,
}

impl MemTransport {
    /// Construct a connected pair of transports.
    pub fn pair() -> (Self, Self) {
        let a = Rc::new(RefCell::new(VecDeque::new()));
        let b = Rc::new(RefCell::new(VecDeque::new()));
        let left_closed = Rc::new(RefCell::new(false));
        let right_closed = Rc::new(RefCell::new(false));

        let left = Self {
            inbound: a.clone(),
            outbound: b.clone(),
            local_closed: left_closed.clone(),
            remote_closed: right_closed.clone(),
        };

        let right = Self {
            inbound: b,
            outbound: a,
            local_closed: right_closed,
            remote_closed: left_closed,
        };

        (left, right)
    }

    /// Close this endpoint; the peer observes it as a dead connection.
    pub fn close(&mut self) {
        *self.local_closed.borrow_mut() = true;
    }
}

impl Transport for MemTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if *self.remote_closed.borrow() {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }

        self.outbound.borrow_mut().extend(bytes);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inbound = self.inbound.borrow_mut();

        if inbound.is_empty() {
            if *self.remote_closed.borrow() {
                return Err(Error::new(ErrorKind::ConnectionClosed));
            }

            return Err(Error::new(ErrorKind::Timeout));
        }

        let mut n = 0;

        while n < buf.len() {
            let Some(byte) = inbound.pop_front() else {
                break;
            };

            buf[n] = byte;
            n += 1;
        }

        Ok(n)
    }
}
