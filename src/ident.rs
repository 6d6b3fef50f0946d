use std::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::iface::{self, ArgDirection, InterfaceDesc, MemberKind};
use crate::Signature;

/// A registered object: a path and the ordered interfaces it implements.
///
/// The path `"*"` matches every object and is used for interfaces common to
/// all objects, such as introspection.
#[derive(Debug, Clone, Copy)]
pub struct Object {
    /// The object path.
    pub path: &'static str,
    /// The interfaces implemented by the object.
    pub interfaces: &'static [InterfaceDesc],
}

/// The object table a message id refers to, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    /// Built-in bus objects.
    Bus = 0,
    /// Application-registered local objects.
    Local = 1,
    /// Application-registered proxy objects.
    Proxy = 2,
}

impl Table {
    const ALL: [Table; 3] = [Table::Bus, Table::Local, Table::Proxy];

    fn from_index(index: u8) -> Option<Table> {
        match index {
            0 => Some(Table::Bus),
            1 => Some(Table::Local),
            2 => Some(Table::Proxy),
            _ => None,
        }
    }
}

/// A packed 32-bit message identifier.
///
/// Identifies one member of one interface of one registered object:
/// `(table << 24) | (path << 16) | (iface << 8) | member`. The top bit of
/// the table byte marks an id that denotes a reply to a call with the
/// unset-bit id.
///
/// # Examples
///
/// ```
/// use alljoyn_thin::{MsgId, Table};
///
/// let id = MsgId::local(0, 0, 2);
/// assert_eq!(id.table(), Some(Table::Local));
/// assert_eq!(id.member_index(), 2);
/// assert!(!id.is_reply());
/// assert!(id.as_reply().is_reply());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MsgId(u32);

impl MsgId {
    const REPLY_BIT: u32 = 0x8000_0000;

    /// Construct an id from its packed representation.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the packed representation.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    const fn pack(table: u8, path: u8, iface: u8, member: u8) -> Self {
        Self((table as u32) << 24 | (path as u32) << 16 | (iface as u32) << 8 | member as u32)
    }

    /// Construct an id into the built-in bus object table.
    pub const fn bus(path: u8, iface: u8, member: u8) -> Self {
        Self::pack(Table::Bus as u8, path, iface, member)
    }

    /// Construct an id into the application local object table.
    pub const fn local(path: u8, iface: u8, member: u8) -> Self {
        Self::pack(Table::Local as u8, path, iface, member)
    }

    /// Construct an id into the application proxy object table.
    pub const fn proxy(path: u8, iface: u8, member: u8) -> Self {
        Self::pack(Table::Proxy as u8, path, iface, member)
    }

    /// The table the id refers to, or `None` for an invalid table index.
    pub fn table(self) -> Option<Table> {
        Table::from_index(((self.0 & !Self::REPLY_BIT) >> 24) as u8)
    }

    /// Index of the object within its table.
    pub const fn path_index(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Index of the interface within its object.
    pub const fn iface_index(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Index of the member within its interface.
    pub const fn member_index(self) -> u8 {
        self.0 as u8
    }

    /// Test if the id denotes a reply.
    pub const fn is_reply(self) -> bool {
        self.0 & Self::REPLY_BIT != 0
    }

    /// The id denoting a reply to a call with this id.
    #[must_use]
    pub const fn as_reply(self) -> Self {
        Self(self.0 | Self::REPLY_BIT)
    }

    /// The call id with the reply bit cleared.
    #[must_use]
    pub const fn as_call(self) -> Self {
        Self(self.0 & !Self::REPLY_BIT)
    }
}

impl fmt::Debug for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgId({:#010x})", self.0)
    }
}

/// The result of looking up an inbound message in the object tables.
pub(crate) struct Match {
    pub(crate) id: MsgId,
    pub(crate) member: &'static str,
    pub(crate) secure: bool,
}

/// A member resolved from a packed id.
pub(crate) struct Unpacked {
    pub(crate) path: &'static str,
    pub(crate) iface: InterfaceDesc,
    pub(crate) member: &'static str,
}

/// The three object tables consulted during identification, in priority
/// order: bus, local, proxy.
#[derive(Debug, Clone, Copy)]
pub struct ObjectTables {
    bus: &'static [Object],
    local: &'static [Object],
    proxy: &'static [Object],
}

impl ObjectTables {
    pub(crate) const fn new(bus: &'static [Object]) -> Self {
        Self {
            bus,
            local: &[],
            proxy: &[],
        }
    }

    pub(crate) fn register(&mut self, local: &'static [Object], proxy: &'static [Object]) {
        self.local = local;
        self.proxy = proxy;
    }

    pub(crate) fn clear(&mut self) {
        self.local = &[];
        self.proxy = &[];
    }

    pub(crate) fn table(&self, table: Table) -> &'static [Object] {
        match table {
            Table::Bus => self.bus,
            Table::Local => self.local,
            Table::Proxy => self.proxy,
        }
    }

    /// Resolve a packed id back into the registered path, interface and
    /// member encoding.
    ///
    /// Every index is bounds-checked against the currently registered
    /// tables: an id packed against a stale registration fails with
    /// `Invalid` instead of reaching freed entries.
    pub(crate) fn unpack(&self, id: MsgId) -> Result<Unpacked> {
        let id = id.as_call();

        let Some(table) = id.table() else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        let objects = self.table(table);

        let Some(object) = objects.get(id.path_index() as usize) else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        let Some(&iface) = object.interfaces.get(id.iface_index() as usize) else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        // Member indices skip the interface name element.
        let Some(&member) = iface.get(id.member_index() as usize + 1) else {
            return Err(Error::new(ErrorKind::Invalid));
        };

        Ok(Unpacked {
            path: object.path,
            iface,
            member,
        })
    }

    /// Match an inbound method call or signal against the registered tables.
    ///
    /// Tables are consulted in priority order and the first member with a
    /// matching kind and name wins; its declared signature must then agree
    /// with the on-wire signature or identification fails with a signature
    /// mismatch rather than falling through to a lesser match.
    pub(crate) fn lookup(
        &self,
        path: &str,
        iface_name: &str,
        member_name: &str,
        kind: MemberKind,
        direction: ArgDirection,
        signature: &Signature,
    ) -> Result<Match> {
        for table in Table::ALL {
            for (p, object) in self.table(table).iter().enumerate() {
                if object.path != "*" && object.path != path {
                    continue;
                }

                for (i, &desc) in object.interfaces.iter().enumerate() {
                    if iface::interface_name(desc) != iface_name {
                        continue;
                    }

                    let Some((m, member)) = iface::find_member(desc, kind, member_name) else {
                        continue;
                    };

                    iface::check_signature(member, direction, signature)?;

                    return Ok(Match {
                        id: MsgId::pack(table as u8, p as u8, i as u8, m as u8),
                        member,
                        secure: iface::is_secure(desc),
                    });
                }
            }
        }

        Err(Error::new(ErrorKind::NoMatch))
    }
}
