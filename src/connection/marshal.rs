//! Marshal path: building and delivering outbound messages.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::arg::{Arg, Container, ContainerKind};
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
use crate::Signature;

use super::walk::SigWalker;
use super::{Connection, TxMsg, TxPhase};

/// Offset of `body_len` within the fixed header, patched at delivery.
const BODY_LEN_AT: usize = 4;
/// Offset of `header_len` within the fixed header.
const HEADER_LEN_AT: usize = 12;
/// Size of the fixed header.
const FIXED_HEADER: usize = 16;

impl<T> Connection<T>
where
    T: Transport,
{
    /// Start a method call to the proxy member identified by `id`.
    ///
    /// The path, interface, member and body signature all come from the
    /// registered interface description. Unless `NO_REPLY_EXPECTED` is set,
    /// a reply context is reserved with the given deadline (the builder
    /// default when `None`); the pool being full is a `Resources` error and
    /// nothing is staged.
    pub fn marshal_method_call(
        &mut self,
        id: MsgId,
        destination: Option<&str>,
        session_id: u32,
        flags: Flags,
        timeout: Option<Duration>,
    ) -> Result<()> {
        if self.tx_msg.is_some() {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        let unpacked = self.tables.unpack(id)?;

        if iface::member_kind(unpacked.member) != Some(MemberKind::Method) {
            return Err(Error::new(ErrorKind::Invalid));
        }

        let sig = iface::compose_signature(unpacked.member, ArgDirection::In)?;

        let flags = if iface::is_secure(unpacked.iface) {
            flags | Flags::ENCRYPTED
        } else {
            flags
        };

        let serial = self.next_serial();

        self.begin_msg(MsgType::METHOD_CALL, flags, serial)?;
        self.field_str(FieldId::PATH, TypeId::OBJECT_PATH, unpacked.path)?;
        self.field_str(
            FieldId::INTERFACE,
            TypeId::STRING,
            iface::interface_name(unpacked.iface),
        )?;
        self.field_str(
            FieldId::MEMBER,
            TypeId::STRING,
            iface::member_name(unpacked.member),
        )?;

        if let Some(destination) = destination {
            self.field_str(FieldId::DESTINATION, TypeId::STRING, destination)?;
        }

        if !sig.is_empty() {
            self.field_sig(&sig)?;
        }

        if session_id != 0 {
            self.field_u32(FieldId::SESSION_ID, session_id)?;
        }

        let body_start = self.finish_header()?;

        let reply_alloc = if flags & Flags::NO_REPLY_EXPECTED {
            false
        } else {
            let timeout = timeout.unwrap_or(self.call_timeout);
            self.replies
                .alloc(serial, id.as_reply(), timeout, Instant::now())?;
            true
        };

        self.tx_msg = Some(TxPhase::Building(TxMsg {
            serial,
            walker: SigWalker::new(&sig),
            body_start,
            reply_alloc,
        }));

        Ok(())
    }

    /// Start a signal emission from the local member identified by `id`.
    pub fn marshal_signal(
        &mut self,
        id: MsgId,
        destination: Option<&str>,
        session_id: u32,
        flags: Flags,
        ttl: Option<u32>,
    ) -> Result<()> {
        if self.tx_msg.is_some() {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        let unpacked = self.tables.unpack(id)?;

        if iface::member_kind(unpacked.member) != Some(MemberKind::Signal) {
            return Err(Error::new(ErrorKind::Invalid));
        }

        let sig = iface::compose_signature(unpacked.member, ArgDirection::Out)?;

        let flags = if iface::is_secure(unpacked.iface) {
            flags | Flags::ENCRYPTED
        } else {
            flags
        };

        let serial = self.next_serial();

        self.begin_msg(MsgType::SIGNAL, flags, serial)?;
        self.field_str(FieldId::PATH, TypeId::OBJECT_PATH, unpacked.path)?;
        self.field_str(
            FieldId::INTERFACE,
            TypeId::STRING,
            iface::interface_name(unpacked.iface),
        )?;
        self.field_str(
            FieldId::MEMBER,
            TypeId::STRING,
            iface::member_name(unpacked.member),
        )?;

        if let Some(destination) = destination {
            self.field_str(FieldId::DESTINATION, TypeId::STRING, destination)?;
        }

        if !sig.is_empty() {
            self.field_sig(&sig)?;
        }

        if session_id != 0 {
            self.field_u32(FieldId::SESSION_ID, session_id)?;
        }

        if let Some(ttl) = ttl {
            self.field_u32(FieldId::TIMESTAMP, timestamp_now())?;
            self.field_u32(FieldId::TIME_TO_LIVE, ttl)?;
        }

        let body_start = self.finish_header()?;

        self.tx_msg = Some(TxPhase::Building(TxMsg {
            serial,
            walker: SigWalker::new(&sig),
            body_start,
            reply_alloc: false,
        }));

        Ok(())
    }

    /// Start the method return for an identified inbound call.
    pub fn marshal_reply(&mut self, info: &MsgInfo) -> Result<()> {
        if self.tx_msg.is_some() {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        if !matches!(info.kind, MsgKind::MethodCall { .. }) {
            return Err(Error::new(ErrorKind::Invalid));
        }

        let Some(id) = info.msg_id else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        let unpacked = self.tables.unpack(id)?;
        let sig = iface::compose_signature(unpacked.member, ArgDirection::Out)?;
        let serial = self.next_serial();

        self.begin_msg(MsgType::METHOD_RETURN, Flags::EMPTY, serial)?;
        self.field_u32(FieldId::REPLY_SERIAL, info.serial)?;

        if let Some(destination) = info.sender.as_deref() {
            self.field_str(FieldId::DESTINATION, TypeId::STRING, destination)?;
        }

        if !sig.is_empty() {
            self.field_sig(&sig)?;
        }

        if info.session_id != 0 {
            self.field_u32(FieldId::SESSION_ID, info.session_id)?;
        }

        let body_start = self.finish_header()?;

        self.tx_msg = Some(TxPhase::Building(TxMsg {
            serial,
            walker: SigWalker::new(&sig),
            body_start,
            reply_alloc: false,
        }));

        Ok(())
    }

    /// Start an error reply to an inbound call.
    ///
    /// Works for unidentified calls as well, since an error body is empty
    /// and needs no interface description.
    pub fn marshal_error(&mut self, info: &MsgInfo, error_name: &str) -> Result<()> {
        if self.tx_msg.is_some() {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        if !matches!(info.kind, MsgKind::MethodCall { .. }) {
            return Err(Error::new(ErrorKind::Invalid));
        }

        let serial = self.next_serial();

        self.begin_msg(MsgType::ERROR, Flags::EMPTY, serial)?;
        self.field_str(FieldId::ERROR_NAME, TypeId::STRING, error_name)?;
        self.field_u32(FieldId::REPLY_SERIAL, info.serial)?;

        if let Some(destination) = info.sender.as_deref() {
            self.field_str(FieldId::DESTINATION, TypeId::STRING, destination)?;
        }

        if info.session_id != 0 {
            self.field_u32(FieldId::SESSION_ID, info.session_id)?;
        }

        let body_start = self.finish_header()?;

        self.tx_msg = Some(TxPhase::Building(TxMsg {
            serial,
            walker: SigWalker::new(Signature::EMPTY),
            body_start,
            reply_alloc: false,
        }));

        Ok(())
    }

    /// Marshal a run of basic values against the declared signature.
    pub fn marshal_args(&mut self, args: &[Arg<'_>]) -> Result<()> {
        let Some(TxPhase::Building(msg)) = self.tx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        let tx = &mut self.tx;

        for arg in args {
            match *arg {
                Arg::Byte(v) => {
                    msg.walker.basic(TypeId::BYTE)?;
                    tx.store(v)?;
                }
                Arg::Bool(v) => {
                    msg.walker.basic(TypeId::BOOLEAN)?;
                    tx.store(v as u32)?;
                }
                Arg::Int16(v) => {
                    msg.walker.basic(TypeId::INT16)?;
                    tx.store(v)?;
                }
                Arg::Uint16(v) => {
                    msg.walker.basic(TypeId::UINT16)?;
                    tx.store(v)?;
                }
                Arg::Int32(v) => {
                    msg.walker.basic(TypeId::INT32)?;
                    tx.store(v)?;
                }
                Arg::Uint32(v) => {
                    msg.walker.basic(TypeId::UINT32)?;
                    tx.store(v)?;
                }
                Arg::Int64(v) => {
                    msg.walker.basic(TypeId::INT64)?;
                    tx.store(v)?;
                }
                Arg::Uint64(v) => {
                    msg.walker.basic(TypeId::UINT64)?;
                    tx.store(v)?;
                }
                Arg::Double(v) => {
                    msg.walker.basic(TypeId::DOUBLE)?;
                    tx.store(v)?;
                }
                Arg::Handle(v) => {
                    msg.walker.basic(TypeId::HANDLE)?;
                    tx.store(v)?;
                }
                Arg::Str(v) => {
                    msg.walker.basic(TypeId::STRING)?;
                    tx.store(v.len() as u32)?;
                    tx.extend_from_slice_nul(v.as_bytes())?;
                }
                Arg::ObjectPath(v) => {
                    msg.walker.basic(TypeId::OBJECT_PATH)?;
                    tx.store(v.len() as u32)?;
                    tx.extend_from_slice_nul(v.as_bytes())?;
                }
                Arg::Sig(v) => {
                    msg.walker.basic(TypeId::SIGNATURE)?;
                    tx.extend_from_slice(&[v.len() as u8])?;
                    tx.extend_from_slice_nul(v.as_bytes())?;
                }
                Arg::ByteArray(v) => {
                    msg.walker.byte_array()?;

                    if v.len() > MAX_ARRAY_LEN as usize {
                        return Err(Error::new(ErrorKind::ArrayTooLong(v.len() as u32)));
                    }

                    tx.store(v.len() as u32)?;
                    tx.extend_from_slice(v)?;
                }
            }
        }

        Ok(())
    }

    /// Open a container, returning the token its close must present.
    pub fn marshal_container(&mut self, kind: ContainerKind) -> Result<Container> {
        let Some(TxPhase::Building(msg)) = self.tx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        let tx = &mut self.tx;

        match kind {
            ContainerKind::Struct => {
                msg.walker.open_struct()?;
                tx.align_mut(8)?;
            }
            ContainerKind::DictEntry => {
                msg.walker.open_dict()?;
                tx.align_mut(8)?;
            }
            ContainerKind::Array => {
                let elem = msg.walker.array_elem()?;
                tx.align_mut(4)?;
                let mark = tx.write_pos();
                tx.store(0u32)?;
                tx.align_mut(elem.alignment())?;
                let data = tx.write_pos();
                msg.walker.open_array(mark, data)?;
            }
        }

        Ok(Container {
            kind,
            depth: msg.walker.depth(),
        })
    }

    /// Close the container identified by `container`.
    ///
    /// Array lengths are patched in place now that the data size is known.
    pub fn marshal_close_container(&mut self, container: Container) -> Result<()> {
        let Some(TxPhase::Building(msg)) = self.tx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if msg.walker.top_kind() != Some(container.kind)
            || msg.walker.depth() != container.depth
        {
            return Err(Error::new(ErrorKind::Unexpected));
        }

        match container.kind {
            ContainerKind::Struct => msg.walker.close_struct()?,
            ContainerKind::DictEntry => msg.walker.close_dict()?,
            ContainerKind::Array => {
                let (mark, data) = msg.walker.close_array()?;
                let len = self.tx.write_pos() - data;

                if len > MAX_ARRAY_LEN as usize {
                    return Err(Error::new(ErrorKind::ArrayTooLong(len as u32)));
                }

                self.tx.store_at(mark, len as u32);
            }
        }

        Ok(())
    }

    /// Announce and enter a variant value.
    ///
    /// The values that follow are checked against `sig` instead of the
    /// declared body signature; once `sig` is exhausted the cursor drops
    /// back out on its own.
    pub fn marshal_variant(&mut self, sig: &Signature) -> Result<()> {
        let Some(TxPhase::Building(msg)) = self.tx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if sig.len() > MAX_SIGNATURE {
            return Err(Error::new(ErrorKind::Resources));
        }

        msg.walker.open_variant(sig)?;
        self.tx.extend_from_slice(&[sig.len() as u8])?;
        self.tx.extend_from_slice_nul(sig.as_bytes())
    }

    /// Finalize and send the staged message.
    ///
    /// The produced body must match the declared signature exactly; a
    /// message with unmarshaled arguments or an open container is a
    /// `Marshal` error and stays open so it can be cancelled.
    pub fn deliver_msg(&mut self) -> Result<()> {
        let msg = match self.tx_msg.take() {
            Some(TxPhase::Building(msg)) => msg,
            other => {
                self.tx_msg = other;
                return Err(Error::new(ErrorKind::Unexpected));
            }
        };

        if !msg.walker.finished() {
            self.tx_msg = Some(TxPhase::Building(msg));
            return Err(Error::new(ErrorKind::Marshal));
        }

        let body_len = self.tx.write_pos() - msg.body_start;

        if body_len > MAX_BODY_LEN as usize {
            return Err(Error::new(ErrorKind::BodyTooLong(body_len as u32)));
        }

        self.tx.store_at(BODY_LEN_AT, body_len as u32);
        self.transport.send(self.tx.get())?;

        trace!(serial = msg.serial, body_len, "delivered message");
        self.tx.reset();
        Ok(())
    }

    /// Send the staged header and body now, declaring `remaining` further
    /// body bytes to be supplied through [`marshal_raw`].
    ///
    /// [`marshal_raw`]: Connection::marshal_raw
    pub fn deliver_msg_partial(&mut self, remaining: usize) -> Result<()> {
        let msg = match self.tx_msg.take() {
            Some(TxPhase::Building(msg)) => msg,
            other => {
                self.tx_msg = other;
                return Err(Error::new(ErrorKind::Unexpected));
            }
        };

        let body_len = self.tx.write_pos() - msg.body_start + remaining;

        if body_len > MAX_BODY_LEN as usize {
            return Err(Error::new(ErrorKind::BodyTooLong(body_len as u32)));
        }

        self.tx.store_at(BODY_LEN_AT, body_len as u32);
        self.transport.send(self.tx.get())?;

        trace!(
            serial = msg.serial,
            body_len,
            remaining,
            "delivered partial message"
        );
        self.tx.reset();

        if remaining > 0 {
            self.tx_msg = Some(TxPhase::Raw { remaining });
        }

        Ok(())
    }

    /// Send raw body bytes owed after a partial delivery.
    ///
    /// Every byte counts against the declared total; exceeding it is a
    /// `Marshal` error, and the message completes when the count reaches
    /// zero.
    pub fn marshal_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(TxPhase::Raw { remaining }) = self.tx_msg.as_mut() else {
            return Err(Error::new(ErrorKind::Unexpected));
        };

        if bytes.len() > *remaining {
            return Err(Error::new(ErrorKind::Marshal));
        }

        self.transport.send(bytes)?;
        *remaining -= bytes.len();

        if *remaining == 0 {
            self.tx_msg = None;
        }

        Ok(())
    }

    /// Abandon the message being built.
    ///
    /// A partially marshaled message cannot be resumed; its reply context,
    /// if any, is released. A message whose header already went out cannot
    /// be abandoned without desynchronizing the stream.
    pub fn cancel_msg(&mut self) -> Result<()> {
        match self.tx_msg.take() {
            Some(TxPhase::Building(msg)) => {
                if msg.reply_alloc {
                    self.replies.take(msg.serial);
                }

                self.tx.reset();
                Ok(())
            }
            Some(TxPhase::Raw { .. }) => Err(Error::new(ErrorKind::Unexpected)),
            None => Ok(()),
        }
    }

    fn begin_msg(&mut self, msg_type: MsgType, flags: Flags, serial: u32) -> Result<()> {
        self.tx.reset();
        self.tx.store(Header {
            endianness: Endianness::NATIVE,
            msg_type,
            flags,
            version: VERSION,
            body_len: 0,
            serial,
            header_len: 0,
        })
    }

    fn field_str(&mut self, id: FieldId, tid: TypeId, value: &str) -> Result<()> {
        self.tx.align_mut(8)?;
        self.tx.store(id)?;
        self.tx.extend_from_slice(&[1, tid.0, 0])?;
        self.tx.align_mut(4)?;
        self.tx.store(value.len() as u32)?;
        self.tx.extend_from_slice_nul(value.as_bytes())
    }

    fn field_u32(&mut self, id: FieldId, value: u32) -> Result<()> {
        self.tx.align_mut(8)?;
        self.tx.store(id)?;
        self.tx.extend_from_slice(&[1, TypeId::UINT32.0, 0])?;
        self.tx.store(value)
    }

    fn field_sig(&mut self, value: &Signature) -> Result<()> {
        self.tx.align_mut(8)?;
        self.tx.store(FieldId::SIGNATURE)?;
        self.tx.extend_from_slice(&[1, TypeId::SIGNATURE.0, 0])?;
        self.tx.extend_from_slice(&[value.len() as u8])?;
        self.tx.extend_from_slice_nul(value.as_bytes())
    }

    /// Patch the header length and pad out to the 8-aligned body start.
    fn finish_header(&mut self) -> Result<usize> {
        let header_len = self.tx.write_pos() - FIXED_HEADER;

        if header_len > MAX_HEADER_LEN as usize {
            return Err(Error::new(ErrorKind::HeaderTooLong(header_len as u32)));
        }

        self.tx.store_at(HEADER_LEN_AT, header_len as u32);
        self.tx.align_mut(8)?;
        Ok(self.tx.write_pos())
    }
}

/// Millisecond wall-clock timestamp, truncated to the wire width.
fn timestamp_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}
