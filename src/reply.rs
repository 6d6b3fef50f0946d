//! Pending-reply bookkeeping for outbound method calls.

use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};
use crate::ident::MsgId;

/// Default number of concurrent pending replies.
pub(crate) const DEFAULT_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Serial of the outstanding call. Zero marks a free slot; the wire
    /// format forbids zero serials so no live call can collide.
    serial: u32,
    id: MsgId,
    deadline: Instant,
}

/// A pending reply whose deadline has passed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Expired {
    pub(crate) serial: u32,
    pub(crate) id: MsgId,
}

/// A fixed-capacity pool of pending reply contexts.
///
/// Every method call sent without `NO_REPLY_EXPECTED` occupies one slot
/// until its reply arrives, its deadline passes or the call is cancelled.
#[derive(Debug)]
pub(crate) struct ReplyPool {
    slots: Box<[Slot]>,
}

impl ReplyPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let slot = Slot {
            serial: 0,
            id: MsgId::from_raw(0),
            deadline: Instant::now(),
        };

        Self {
            slots: vec![slot; capacity.max(1)].into(),
        }
    }

    /// Reserve a slot for a call with the given serial.
    ///
    /// Errors with `Resources` when every slot is occupied.
    pub(crate) fn alloc(
        &mut self,
        serial: u32,
        id: MsgId,
        timeout: Duration,
        now: Instant,
    ) -> Result<()> {
        debug_assert_ne!(serial, 0);

        for slot in self.slots.iter_mut() {
            if slot.serial == 0 {
                *slot = Slot {
                    serial,
                    id,
                    deadline: now + timeout,
                };

                return Ok(());
            }
        }

        Err(Error::new(ErrorKind::Resources))
    }

    /// Release the slot matching `serial` and return the reply id it was
    /// reserved for.
    pub(crate) fn take(&mut self, serial: u32) -> Option<MsgId> {
        for slot in self.slots.iter_mut() {
            if slot.serial == serial {
                slot.serial = 0;
                return Some(slot.id);
            }
        }

        None
    }

    /// Release and return the first slot whose deadline has strictly
    /// passed. A call at exactly its deadline is still pending.
    pub(crate) fn poll_expired(&mut self, now: Instant) -> Option<Expired> {
        for slot in self.slots.iter_mut() {
            if slot.serial != 0 && slot.deadline < now {
                let expired = Expired {
                    serial: slot.serial,
                    id: slot.id,
                };

                slot.serial = 0;
                return Some(expired);
            }
        }

        None
    }

    /// Release every slot.
    pub(crate) fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.serial = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_take() {
        let now = Instant::now();
        let mut pool = ReplyPool::new(2);

        pool.alloc(1, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();
        pool.alloc(2, MsgId::proxy(0, 0, 1), Duration::from_secs(5), now)
            .unwrap();

        assert_eq!(pool.take(2), Some(MsgId::proxy(0, 0, 1)));
        assert_eq!(pool.take(2), None);
        assert_eq!(pool.take(1), Some(MsgId::proxy(0, 0, 0)));
    }

    #[test]
    fn exhaustion() {
        let now = Instant::now();
        let mut pool = ReplyPool::new(2);

        pool.alloc(1, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();
        pool.alloc(2, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();

        let err = pool
            .alloc(3, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap_err();
        assert!(err.is_resources());

        // A released slot becomes allocatable again.
        pool.take(1);
        pool.alloc(3, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();
    }

    #[test]
    fn expiry() {
        let now = Instant::now();
        let mut pool = ReplyPool::new(2);

        pool.alloc(7, MsgId::proxy(1, 0, 2), Duration::from_millis(10), now)
            .unwrap();

        assert!(pool.poll_expired(now).is_none());

        // Exactly at the deadline the call is still pending.
        assert!(pool.poll_expired(now + Duration::from_millis(10)).is_none());

        let expired = pool
            .poll_expired(now + Duration::from_millis(11))
            .unwrap();
        assert_eq!(expired.serial, 7);
        assert_eq!(expired.id, MsgId::proxy(1, 0, 2));

        // Expiry releases the slot.
        assert!(pool.poll_expired(now + Duration::from_secs(1)).is_none());
        assert_eq!(pool.take(7), None);
    }

    #[test]
    fn clear_releases_everything() {
        let now = Instant::now();
        let mut pool = ReplyPool::new(2);

        pool.alloc(1, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();
        pool.alloc(2, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();

        pool.clear();
        assert_eq!(pool.take(1), None);
        pool.alloc(1, MsgId::proxy(0, 0, 0), Duration::from_secs(5), now)
            .unwrap();
    }
}
