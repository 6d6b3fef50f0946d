//! Unmarshal path: receiving, identifying and consuming inbound messages.

use std::str::from_utf8;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::arg::{Arg, Container, ContainerKind};
use crate::buf::{padding_to, ReadView};
use crate::bus;
use crate::error::{Error, ErrorKind, Result};
use crate::iface::{self, ArgDirection, MemberKind};
use crate::ident::MsgId;
use crate::msg::{MsgInfo, MsgKind};
use crate::protocol::{
    Endianness, FieldId, Flags, Header, MsgType, TypeId, MAX_ARRAY_LEN, MAX_BODY_LEN,
    MAX_HEADER_LEN, VERSION,
};
use crate::signature::MAX_SIGNATURE;
use crate::transport::Transport;
use crate::{Signature, SignatureBuf};

use super::walk::SigWalker;
use super::{Connection, RxMsg};

/// Size of the fixed message header.
const FIXED_HEADER: usize = 16;

/// Header fields collected while parsing the variable section.
struct Fields {
    path: Option<Box<str>>,
    interface: Option<Box<str>>,
    member: Option<Box<str>>,
    error_name: Option<Box<str>>,
    destination: Option<Box<str>>,
    sender: Option<Box<str>>,
    reply_serial: Option<u32>,
    signature: SignatureBuf,
    session_id: u32,
    timestamp: Option<u32>,
    ttl: Option<u32>,
}

impl Fields {
    fn empty() -> Self {
        Self {
            path: None,
            interface: None,
            member: None,
            error_name: None,
            destination: None,
            sender: None,
            reply_serial: None,
            signature: SignatureBuf::empty(),
            session_id: 0,
            timestamp: None,
            ttl: None,
        }
    }

    fn require(field: Option<Box<str>>, name: &'static str) -> Result<Box<str>> {
        field.ok_or(Error::new(ErrorKind::MissingHeaderField(name)))
    }
}

impl<T> Connection<T>
where
    T: Transport,
{
    /// Receive the next message, blocking for at most `timeout`.
    ///
    /// A pending reply past its deadline is surfaced as a synthesized
    /// inbound `org.alljoyn.Bus.Timeout` error carrying the reply id of the
    /// timed out call, so the caller's dispatch loop handles local timeouts
    /// and real errors through the same path. Expiry is only checked while
    /// the wire is idle; a reply already buffered is always delivered.
    ///
    /// Only the fixed header and the header-field section are consumed here;
    /// body arguments stay on the wire until unmarshaled arg-by-arg. A
    /// previous message still open is drained first.
    pub fn unmarshal_msg(&mut self, timeout: Duration) -> Result<MsgInfo> {
        self.close_msg()?;

        if let Err(e) = self.fill_rx(FIXED_HEADER, timeout) {
            if !e.is_timeout() || self.rx.available() != 0 {
                return Err(e);
            }

            let Some(expired) = self.replies.poll_expired(Instant::now()) else {
                return Err(e);
            };

            warn!(serial = expired.serial, "pending reply timed out");

            let kind = MsgKind::Error {
                error_name: bus::ERROR_TIMEOUT.into(),
                reply_serial: expired.serial,
            };

            let mut info = MsgInfo::new(kind, 0);
            info.msg_id = Some(expired.id);
            return Ok(info);
        }

        let endianness = match self.rx.get()[0] {
            b if b == Endianness::LITTLE.0 => Endianness::LITTLE,
            b if b == Endianness::BIG.0 => Endianness::BIG,
            b => return Err(Error::new(ErrorKind::InvalidEndianness(b))),
        };

        let mut view = ReadView::new(&self.rx.get()[..FIXED_HEADER], endianness);
        let header = view.load::<Header>()?;

        if header.version != VERSION {
            return Err(Error::new(ErrorKind::InvalidProtocolVersion(header.version)));
        }

        match header.msg_type {
            MsgType::METHOD_CALL | MsgType::METHOD_RETURN | MsgType::ERROR | MsgType::SIGNAL => {}
            t => return Err(Error::new(ErrorKind::InvalidMessageType(t.0))),
        }

        if header.serial == 0 {
            return Err(Error::new(ErrorKind::ZeroSerial));
        }

        if header.header_len > MAX_HEADER_LEN {
            return Err(Error::new(ErrorKind::HeaderTooLong(header.header_len)));
        }

        if header.body_len > MAX_BODY_LEN {
            return Err(Error::new(ErrorKind::BodyTooLong(header.body_len)));
        }

        self.rx.advance(FIXED_HEADER);

        // The header section is padded out to the 8-aligned body start.
        let header_len = header.header_len as usize;
        let section = header_len + padding_to(8, header_len);
        let body_len = header.body_len as usize;

        // A message that fails past this point is discarded whole: the
        // declared lengths are sound, so its unread remainder is staged for
        // the drain in `close_msg` and the stream stays aligned on the next
        // fixed header.
        if let Err(e) = self.fill_rx(section, timeout) {
            self.discard_msg(endianness, section + body_len);
            return Err(e);
        }

        let mut fields = match parse_fields(&self.rx.get()[..header_len], endianness) {
            Ok(fields) => fields,
            Err(e) => {
                self.discard_msg(endianness, section + body_len);
                return Err(e);
            }
        };

        self.rx.advance(section);

        let kind = match message_kind(&header, &mut fields) {
            Ok(kind) => kind,
            Err(e) => {
                self.discard_msg(endianness, body_len);
                return Err(e);
            }
        };

        let mut info = MsgInfo::new(kind, header.serial);
        info.flags = header.flags;
        info.interface = fields.interface;
        info.destination = fields.destination;
        info.sender = fields.sender;
        info.signature = fields.signature;
        info.session_id = fields.session_id;
        info.timestamp = fields.timestamp;
        info.ttl = fields.ttl;
        info.body_len = header.body_len;

        trace!(
            msg_type = ?header.msg_type,
            serial = header.serial,
            body_len = header.body_len,
            "received message"
        );

        self.rx_msg = Some(RxMsg {
            endianness,
            body_len,
            consumed: 0,
            walker: SigWalker::new(&info.signature),
            raw: false,
        });

        Ok(info)
    }

    /// Resolve an inbound message against the object tables or the reply
    /// pool, recording the id in `info`.
    ///
    /// An unidentifiable method call is answered on the spot with a
    /// `ServiceUnknown` error, and a call to a secure interface that arrived
    /// unencrypted with a `SecurityViolation` error, unless the caller asked
    /// for no reply. Signals fail silently and replies that match no pending
    /// call stay unidentified.
    pub fn identify_msg(&mut self, info: &mut MsgInfo) -> Result<MsgId> {
        if let Some(id) = info.msg_id {
            return Ok(id);
        }

        match &info.kind {
            MsgKind::MethodCall { path, member } => {
                let iface_name = info.interface.as_deref().unwrap_or("");

                let found = self.tables.lookup(
                    path,
                    iface_name,
                    member,
                    MemberKind::Method,
                    ArgDirection::In,
                    &info.signature,
                );

                match found {
                    Ok(m) => {
                        if m.secure && !(info.flags & Flags::ENCRYPTED) {
                            warn!(
                                member = &**member,
                                "secure interface called without encryption"
                            );
                            self.auto_error(info, bus::ERROR_SECURITY_VIOLATION);
                            return Err(Error::new(ErrorKind::Disallowed));
                        }

                        debug!(id = ?m.id, member = &**member, "identified method call");
                        info.msg_id = Some(m.id);
                        Ok(m.id)
                    }
                    Err(e) => {
                        warn!(member = &**member, %e, "failed to identify method call");
                        self.auto_error(info, bus::ERROR_SERVICE_UNKNOWN);
                        Err(e)
                    }
                }
            }
            MsgKind::Signal { path, member } => {
                let iface_name = info.interface.as_deref().unwrap_or("");

                let found = self.tables.lookup(
                    path,
                    iface_name,
                    member,
                    MemberKind::Signal,
                    ArgDirection::Out,
                    &info.signature,
                );

                match found {
                    Ok(m) => {
                        debug!(id = ?m.id, member = &**member, "identified signal");
                        info.msg_id = Some(m.id);
                        Ok(m.id)
                    }
                    Err(e) => {
                        debug!(member = &**member, %e, "unidentified signal");
                        Err(e)
                    }
                }
            }
            MsgKind::MethodReturn { reply_serial } => {
                let Some(id) = self.replies.take(*reply_serial) else {
                    warn!(reply_serial, "orphaned method return");
                    return Err(Error::new(ErrorKind::NoMatch));
                };

                let unpacked = self.tables.unpack(id)?;
                iface::check_signature(unpacked.member, ArgDirection::Out, &info.signature)?;

                debug!(id = ?id, reply_serial, "identified method return");
                info.msg_id = Some(id);
                Ok(id)
            }
            MsgKind::Error { reply_serial, .. } => {
                let Some(id) = self.replies.take(*reply_serial) else {
                    warn!(reply_serial, "orphaned error reply");
                    return Err(Error::new(ErrorKind::NoMatch));
                };

                // Error bodies are free-form; signature checks don't apply.
                debug!(id = ?id, reply_serial, "identified error reply");
                info.msg_id = Some(id);
                Ok(id)
            }
        }
    }

    /// Consume the next body argument.
    ///
    /// The returned value borrows the RX buffer and stays valid until the
    /// next call on the connection.
    pub fn unmarshal_arg(&mut self) -> Result<Arg<'_>> {
        let mut out = [Arg::Byte(0)];
        self.unmarshal_args(&mut out)?;
        Ok(out[0])
    }

    /// Consume one body argument per slot of `out`.
    ///
    /// Refills from the transport as needed; nothing is consumed unless the
    /// whole run parses.
    pub fn unmarshal_args<'a>(&'a mut self, out: &mut [Arg<'a>]) -> Result<()> {
        let (total, base, endianness, mut replay) = loop {
            let Some(rxm) = self.rx_msg.as_ref() else {
                return Err(Error::new(ErrorKind::Unexpected));
            };

            if rxm.raw {
                return Err(Error::new(ErrorKind::Unexpected));
            }

            let body_rem = rxm.body_len - rxm.consumed;
            let capped = self.rx.available().min(body_rem);
            let mut walker = rxm.walker.clone();
            let mut view = ReadView::with_base(&self.rx.get()[..capped], rxm.endianness, rxm.consumed);

            let mut failed = None;

            for _ in 0..out.len() {
                if let Err(e) = parse_one(&mut view, &mut walker, rxm.consumed) {
                    failed = Some(e);
                    break;
                }
            }

            match failed {
                None => {
                    let total = view.pos();
                    let base = rxm.consumed;
                    let endianness = rxm.endianness;
                    let replay = rxm.walker.clone();

                    self.rx.advance(total);

                    let Some(rxm) = self.rx_msg.as_mut() else {
                        return Err(Error::new(ErrorKind::Unexpected));
                    };

                    rxm.consumed += total;
                    rxm.walker = walker;
                    break (total, base, endianness, replay);
                }
                Some(e) if e.is_buffer_underflow() => {
                    if self.rx.available() >= body_rem {
                        return Err(Error::new(ErrorKind::Unmarshal));
                    }

                    let min = self.rx.available() + 1;
                    self.fill_rx(min, self.call_timeout)?;
                }
                Some(e) => return Err(e),
            }
        };

        // Replay over the committed bytes to hand out the borrowed values.
        let mut view = ReadView::with_base(self.rx.taken(total), endianness, base);

        for slot in out.iter_mut() {
            *slot = parse_one(&mut view, &mut replay, base)?;
        }

        Ok(())
    }

    /// Enter a container declared at the cursor.
    ///
    /// Inside an array, `NoMore` reports that every element has been
    /// consumed.
    pub fn unmarshal_container(&mut self, kind: ContainerKind) -> Result<Container> {
        let Some(rxm) = self.rx_msg.as_ref() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if rxm.raw {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        if let Some(end) = rxm.walker.top_array_data() {
            if rxm.consumed >= end {
                return Err(Error::new(ErrorKind::NoMore));
            }
        }

        match kind {
            ContainerKind::Struct => {
                self.with_walker(|w| w.open_struct())?;
                self.rx_pad(8)?;
            }
            ContainerKind::DictEntry => {
                self.with_walker(|w| w.open_dict())?;
                self.rx_pad(8)?;
            }
            ContainerKind::Array => {
                let elem = self.with_walker(|w| w.array_elem())?;

                self.rx_pad(4)?;
                self.rx_need(4)?;

                let Some(rxm) = self.rx_msg.as_ref() else {
                    return Err(Error::new(ErrorKind::Unexpected));
                };

                let mut view =
                    ReadView::with_base(&self.rx.get()[..4], rxm.endianness, rxm.consumed);
                let len = view.load::<u32>()? as usize;

                if len > MAX_ARRAY_LEN as usize {
                    return Err(Error::new(ErrorKind::ArrayTooLong(len as u32)));
                }

                self.rx.advance(4);

                let Some(rxm) = self.rx_msg.as_mut() else {
                    return Err(Error::new(ErrorKind::Unexpected));
                };

                rxm.consumed += 4;

                self.rx_pad(elem.alignment())?;

                let Some(rxm) = self.rx_msg.as_mut() else {
                    return Err(Error::new(ErrorKind::Unexpected));
                };

                let data_end = rxm.consumed + len;

                if data_end > rxm.body_len {
                    return Err(Error::new(ErrorKind::Unmarshal));
                }

                rxm.walker.open_array(0, data_end)?;
            }
        }

        let Some(rxm) = self.rx_msg.as_ref() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        Ok(Container {
            kind,
            depth: rxm.walker.depth(),
        })
    }

    /// Leave the container identified by `container`, skipping whatever of
    /// its declared content was not consumed.
    pub fn unmarshal_close_container(&mut self, container: Container) -> Result<()> {
        let Some(rxm) = self.rx_msg.as_ref() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if rxm.walker.top_kind() != Some(container.kind)
            || rxm.walker.depth() != container.depth
        {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        match container.kind {
            ContainerKind::Array => {
                let Some(end) = rxm.walker.top_array_data() else {
                    return Err(Error::new(ErrorKind::Unexpected));
                };

                self.rx_drain_to(end)?;
                self.with_walker(|w| w.close_array().map(|_| ()))
            }
            ContainerKind::Struct => {
                self.skip_until(TypeId::CLOSE_PAREN)?;
                self.with_walker(|w| w.close_struct())
            }
            ContainerKind::DictEntry => {
                self.skip_until(TypeId::CLOSE_BRACE)?;
                self.with_walker(|w| w.close_dict())
            }
        }
    }

    /// Consume a variant announcement, returning the signature its value
    /// was sent with.
    ///
    /// The following unmarshal calls decode against the returned signature;
    /// once it is exhausted the cursor drops back to the declared body
    /// signature.
    pub fn unmarshal_variant(&mut self) -> Result<SignatureBuf> {
        loop {
            let Some(rxm) = self.rx_msg.as_ref() else {
                return Err(Error::new(ErrorKind::Unexpected));
            };

            if rxm.raw {
                return Err(Error::new(ErrorKind::Unexpected));
            }

            if let Some(end) = rxm.walker.top_array_data() {
                if rxm.consumed >= end {
                    return Err(Error::new(ErrorKind::NoMore));
                }
            }

            let body_rem = rxm.body_len - rxm.consumed;
            let capped = self.rx.available().min(body_rem);
            let mut view =
                ReadView::with_base(&self.rx.get()[..capped], rxm.endianness, rxm.consumed);

            match view.load_signature_str() {
                Ok(s) => {
                    if s.len() > MAX_SIGNATURE {
                        return Err(Error::new(ErrorKind::Resources));
                    }

                    let sig = Signature::new(s.as_bytes())?;
                    let owned = SignatureBuf::from_signature(sig);
                    let total = view.pos();

                    self.rx.advance(total);

                    let Some(rxm) = self.rx_msg.as_mut() else {
                        return Err(Error::new(ErrorKind::Unexpected));
                    };

                    rxm.consumed += total;
                    rxm.walker.open_variant(&owned)?;
                    return Ok(owned);
                }
                Err(e) if e.is_buffer_underflow() => {
                    if self.rx.available() >= body_rem {
                        return Err(Error::new(ErrorKind::Unmarshal));
                    }

                    let min = self.rx.available() + 1;
                    self.fill_rx(min, self.call_timeout)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Consume up to `len` raw body bytes, bypassing signature tracking for
    /// the rest of the message.
    ///
    /// Returns at least one byte unless the body is exhausted, which is
    /// `NoMore`. The slice stays valid until the next unmarshal call.
    pub fn unmarshal_raw(&mut self, len: usize) -> Result<&[u8]> {
        let Some(rxm) = self.rx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        rxm.raw = true;
        let body_rem = rxm.body_len - rxm.consumed;

        if body_rem == 0 || len == 0 {
            return Err(Error::new(ErrorKind::NoMore));
        }

        if self.rx.available() == 0 {
            self.fill_rx(1, self.call_timeout)?;
        }

        let n = len.min(self.rx.available()).min(body_rem);
        self.rx.advance(n);

        let Some(rxm) = self.rx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        rxm.consumed += n;
        Ok(self.rx.taken(n))
    }

    /// Finish with the current inbound message, draining whatever of its
    /// declared body was not consumed.
    pub fn close_msg(&mut self) -> Result<()> {
        let Some(rxm) = self.rx_msg.take() else {
            return Ok(());
        };

        let mut remaining = rxm.body_len - rxm.consumed;

        while remaining > 0 {
            if self.rx.available() == 0 {
                self.fill_rx(1, self.call_timeout)?;
            }

            let n = self.rx.available().min(remaining);
            self.rx.advance(n);
            remaining -= n;
        }

        Ok(())
    }

    /// Stage the unread remainder of a rejected message so the next
    /// `close_msg` drains it.
    fn discard_msg(&mut self, endianness: Endianness, remaining: usize) {
        self.rx_msg = Some(RxMsg {
            endianness,
            body_len: remaining,
            consumed: 0,
            walker: SigWalker::new(Signature::EMPTY),
            raw: true,
        });
    }

    fn auto_error(&mut self, info: &MsgInfo, name: &str) {
        if info.flags & Flags::NO_REPLY_EXPECTED {
            return;
        }

        // An open outbound message takes precedence over the auto reply.
        if self.tx_msg.is_some() {
            return;
        }

        let sent = self
            .marshal_error(info, name)
            .and_then(|()| self.deliver_msg());

        if let Err(e) = sent {
            warn!(%e, error_name = name, "failed to send auto error reply");
        }
    }

    fn with_walker<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut SigWalker) -> Result<R>,
    {
        let Some(rxm) = self.rx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        f(&mut rxm.walker)
    }

    /// Guarantee `n` unconsumed body bytes are buffered.
    fn rx_need(&mut self, n: usize) -> Result<()> {
        let Some(rxm) = self.rx_msg.as_ref() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if rxm.body_len - rxm.consumed < n {
            return Err(Error::new(ErrorKind::Unmarshal));
        }

        self.fill_rx(n, self.call_timeout)
    }

    /// Consume alignment padding at the cursor.
    fn rx_pad(&mut self, align: usize) -> Result<()> {
        let Some(rxm) = self.rx_msg.as_ref() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        let pad = padding_to(align, rxm.consumed);

        if pad == 0 {
            return Ok(());
        }

        self.rx_need(pad)?;
        self.rx.advance(pad);

        let Some(rxm) = self.rx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        rxm.consumed += pad;
        Ok(())
    }

    /// Consume body bytes up to the absolute body offset `end`.
    fn rx_drain_to(&mut self, end: usize) -> Result<()> {
        loop {
            let Some(rxm) = self.rx_msg.as_ref() else {
                return Err(Error::new(ErrorKind::Unexpected));
            };

            let Some(remaining) = end.checked_sub(rxm.consumed) else {
                return Err(Error::new(ErrorKind::Unmarshal));
            };

            if remaining == 0 {
                return Ok(());
            }

            if self.rx.available() == 0 {
                self.fill_rx(1, self.call_timeout)?;
            }

            let n = self.rx.available().min(remaining);
            self.rx.advance(n);

            let Some(rxm) = self.rx_msg.as_mut() else {
                return Err(Error::new(ErrorKind::Unexpected));
            };

            rxm.consumed += n;
        }
    }

    /// Skip declared values until the cursor reaches `close`.
    fn skip_until(&mut self, close: TypeId) -> Result<()> {
        loop {
            let tid = self.with_walker(|w| Ok(w.peek()))?;

            match tid {
                Some(t) if t == close => return Ok(()),
                Some(_) => self.skip_value()?,
                None => return Err(Error::new(ErrorKind::Unmarshal)),
            }
        }
    }

    /// Consume and discard one complete value at the cursor.
    fn skip_value(&mut self) -> Result<()> {
        let Some(tid) = self.with_walker(|w| Ok(w.peek()))? else {
            return Err(Error::new(ErrorKind::Unmarshal));
        };

        match tid {
            TypeId::OPEN_PAREN => {
                let c = self.unmarshal_container(ContainerKind::Struct)?;
                self.unmarshal_close_container(c)
            }
            TypeId::OPEN_BRACE => {
                let c = self.unmarshal_container(ContainerKind::DictEntry)?;
                self.unmarshal_close_container(c)
            }
            TypeId::ARRAY => {
                let c = self.unmarshal_container(ContainerKind::Array)?;
                self.unmarshal_close_container(c)
            }
            TypeId::VARIANT => {
                let sig = self.unmarshal_variant()?;

                if sig.is_empty() {
                    return Ok(());
                }

                self.skip_value()
            }
            _ => {
                self.unmarshal_arg()?;
                Ok(())
            }
        }
    }
}

/// Parse one body value out of `view`, advancing the signature cursor.
///
/// `at` is the absolute body offset the view starts at; together with the
/// view position it locates the cursor against an enclosing array's data
/// end.
fn parse_one<'v>(view: &mut ReadView<'v>, walker: &mut SigWalker, at: usize) -> Result<Arg<'v>> {
    let Some(tid) = walker.peek() else {
        return Err(Error::new(ErrorKind::NoMore));
    };

    if let Some(end) = walker.top_array_data() {
        if at + view.pos() >= end {
            return Err(Error::new(ErrorKind::NoMore));
        }
    }

    match tid {
        TypeId::BYTE => {
            let v = view.load::<u8>()?;
            walker.basic(tid)?;
            Ok(Arg::Byte(v))
        }
        TypeId::BOOLEAN => {
            let v = match view.load::<u32>()? {
                0 => false,
                1 => true,
                _ => return Err(Error::new(ErrorKind::Unmarshal)),
            };
            walker.basic(tid)?;
            Ok(Arg::Bool(v))
        }
        TypeId::INT16 => {
            let v = view.load::<i16>()?;
            walker.basic(tid)?;
            Ok(Arg::Int16(v))
        }
        TypeId::UINT16 => {
            let v = view.load::<u16>()?;
            walker.basic(tid)?;
            Ok(Arg::Uint16(v))
        }
        TypeId::INT32 => {
            let v = view.load::<i32>()?;
            walker.basic(tid)?;
            Ok(Arg::Int32(v))
        }
        TypeId::UINT32 => {
            let v = view.load::<u32>()?;
            walker.basic(tid)?;
            Ok(Arg::Uint32(v))
        }
        TypeId::INT64 => {
            let v = view.load::<i64>()?;
            walker.basic(tid)?;
            Ok(Arg::Int64(v))
        }
        TypeId::UINT64 => {
            let v = view.load::<u64>()?;
            walker.basic(tid)?;
            Ok(Arg::Uint64(v))
        }
        TypeId::DOUBLE => {
            let v = view.load::<f64>()?;
            walker.basic(tid)?;
            Ok(Arg::Double(v))
        }
        TypeId::HANDLE => {
            let v = view.load::<u32>()?;
            walker.basic(tid)?;
            Ok(Arg::Handle(v))
        }
        TypeId::STRING => {
            let len = view.load::<u32>()? as usize;
            let bytes = view.load_slice_nul(len)?;
            let v = from_utf8(bytes)?;
            walker.basic(tid)?;
            Ok(Arg::Str(v))
        }
        TypeId::OBJECT_PATH => {
            let len = view.load::<u32>()? as usize;
            let bytes = view.load_slice_nul(len)?;
            let v = from_utf8(bytes)?;
            walker.basic(tid)?;
            Ok(Arg::ObjectPath(v))
        }
        TypeId::SIGNATURE => {
            let len = view.load::<u8>()? as usize;
            let bytes = view.load_slice_nul(len)?;
            let v = Signature::new(bytes)?;
            walker.basic(tid)?;
            Ok(Arg::Sig(v))
        }
        TypeId::ARRAY => {
            // Only the `ay` fast path decodes as a single argument.
            walker.byte_array()?;
            let len = view.load::<u32>()? as usize;

            if len > MAX_ARRAY_LEN as usize {
                return Err(Error::new(ErrorKind::ArrayTooLong(len as u32)));
            }

            let bytes = view.load_slice(len)?;
            Ok(Arg::ByteArray(bytes))
        }
        TypeId::VARIANT | TypeId::OPEN_PAREN | TypeId::OPEN_BRACE => {
            Err(Error::new(ErrorKind::Unexpected))
        }
        _ => Err(Error::new(ErrorKind::Unmarshal)),
    }
}

/// Build the message kind from the parsed header fields, checking that
/// every field the type requires is present.
fn message_kind(header: &Header, fields: &mut Fields) -> Result<MsgKind> {
    let kind = match header.msg_type {
        MsgType::METHOD_CALL => MsgKind::MethodCall {
            path: Fields::require(fields.path.take(), "PATH")?,
            member: Fields::require(fields.member.take(), "MEMBER")?,
        },
        MsgType::METHOD_RETURN => MsgKind::MethodReturn {
            reply_serial: fields
                .reply_serial
                .ok_or(Error::new(ErrorKind::MissingHeaderField("REPLY_SERIAL")))?,
        },
        MsgType::ERROR => MsgKind::Error {
            error_name: Fields::require(fields.error_name.take(), "ERROR_NAME")?,
            reply_serial: fields
                .reply_serial
                .ok_or(Error::new(ErrorKind::MissingHeaderField("REPLY_SERIAL")))?,
        },
        _ => MsgKind::Signal {
            path: Fields::require(fields.path.take(), "PATH")?,
            member: Fields::require(fields.member.take(), "MEMBER")?,
        },
    };

    // A declared body needs a signature to drive unmarshaling.
    if fields.signature.is_empty() && header.body_len != 0 {
        return Err(Error::new(ErrorKind::Unmarshal));
    }

    Ok(kind)
}

/// Parse the variable header-field section.
fn parse_fields(bytes: &[u8], endianness: Endianness) -> Result<Fields> {
    let mut view = ReadView::new(bytes, endianness);
    let mut fields = Fields::empty();

    while !view.is_empty() {
        view.align(8)?;

        if view.is_empty() {
            break;
        }

        let field = view.load::<FieldId>()?;
        let fsig = view.load_signature_str()?;

        match field {
            FieldId::PATH => {
                expect_field_sig(fsig, "o")?;
                fields.path = Some(view.load_string()?.into());
            }
            FieldId::INTERFACE => {
                expect_field_sig(fsig, "s")?;
                fields.interface = Some(view.load_string()?.into());
            }
            FieldId::MEMBER => {
                expect_field_sig(fsig, "s")?;
                fields.member = Some(view.load_string()?.into());
            }
            FieldId::ERROR_NAME => {
                expect_field_sig(fsig, "s")?;
                fields.error_name = Some(view.load_string()?.into());
            }
            FieldId::REPLY_SERIAL => {
                expect_field_sig(fsig, "u")?;
                fields.reply_serial = Some(view.load::<u32>()?);
            }
            FieldId::DESTINATION => {
                expect_field_sig(fsig, "s")?;
                fields.destination = Some(view.load_string()?.into());
            }
            FieldId::SENDER => {
                expect_field_sig(fsig, "s")?;
                fields.sender = Some(view.load_string()?.into());
            }
            FieldId::SIGNATURE => {
                expect_field_sig(fsig, "g")?;
                let s = view.load_signature_str()?;
                let sig = Signature::new(s.as_bytes())?;
                fields.signature = SignatureBuf::from_signature(sig);
            }
            FieldId::SESSION_ID => {
                expect_field_sig(fsig, "u")?;
                fields.session_id = view.load::<u32>()?;
            }
            FieldId::TIMESTAMP => {
                expect_field_sig(fsig, "u")?;
                fields.timestamp = Some(view.load::<u32>()?);
            }
            FieldId::TIME_TO_LIVE => {
                expect_field_sig(fsig, "u")?;
                fields.ttl = Some(view.load::<u32>()?);
            }
            _ => skip_field(&mut view, fsig)?,
        }
    }

    Ok(fields)
}

fn expect_field_sig(actual: &str, expected: &str) -> Result<()> {
    if actual != expected {
        return Err(Error::new(ErrorKind::Unmarshal));
    }

    Ok(())
}

/// Skip an unrecognized header field by its announced signature.
fn skip_field(view: &mut ReadView<'_>, fsig: &str) -> Result<()> {
    match fsig.as_bytes().first() {
        Some(b'y') => {
            view.load::<u8>()?;
        }
        Some(b'n' | b'q') => {
            view.load::<u16>()?;
        }
        Some(b'b' | b'i' | b'u' | b'h') => {
            view.load::<u32>()?;
        }
        Some(b'x' | b't' | b'd') => {
            view.load::<u64>()?;
        }
        Some(b's' | b'o') => {
            view.load_string()?;
        }
        Some(b'g') => {
            view.load_signature_str()?;
        }
        _ => return Err(Error::new(ErrorKind::Unmarshal)),
    }

    Ok(())
}
