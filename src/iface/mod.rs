//! The compact interface-description model.
//!
//! Interfaces are declared as ordered lists of terse strings instead of
//! introspection XML: element 0 names the interface, optionally prefixed
//! with a security marker, and every further element encodes one member.
//!
//! ```text
//! ?name arg<s out>u     method:   leading `?`, args with `<`/`>` direction
//! !name val>i           signal:   leading `!`, args marked `>`
//! @name=u               property: leading `@`, access `<`/`>`/`=`, one type
//! ```
//!
//! Member strings are scanned lazily, character by character, whenever a
//! signature needs to be composed or checked; no parsed representation is
//! retained.

use crate::error::{Error, ErrorKind, Result};
use crate::{Signature, SignatureBuf};

pub(crate) use self::xml::introspect_node;
mod xml;

#[cfg(test)]
mod tests;

/// An interface in compact encoding: the interface name followed by one
/// string per member.
pub type InterfaceDesc = &'static [&'static str];

/// Marker prefixing a secure interface name.
pub(crate) const SECURE_ON: u8 = b'$';

/// Marker prefixing an interface name that explicitly opts out of security.
pub(crate) const SECURE_OFF: u8 = b'#';

/// The kind of a member, from its leading marker character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// `?` — a method.
    Method,
    /// `!` — a signal.
    Signal,
    /// `@` — a property.
    Property,
}

impl MemberKind {
    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'?' => Some(MemberKind::Method),
            b'!' => Some(MemberKind::Signal),
            b'@' => Some(MemberKind::Property),
            _ => None,
        }
    }
}

/// The direction of an argument in a member encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDirection {
    /// `<` — an input argument.
    In,
    /// `>` — an output argument.
    Out,
}

impl ArgDirection {
    fn marker(self) -> u8 {
        match self {
            ArgDirection::In => b'<',
            ArgDirection::Out => b'>',
        }
    }
}

/// A property access operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropOp {
    /// Read the property value.
    Get,
    /// Write the property value.
    Set,
}

/// The declared access rights of a property member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropAccess {
    /// `>` — readable only.
    Read,
    /// `<` — writable only.
    Write,
    /// `=` — readable and writable.
    ReadWrite,
}

impl PropAccess {
    fn allows(self, op: PropOp) -> bool {
        match (self, op) {
            (PropAccess::Read, PropOp::Set) => false,
            (PropAccess::Write, PropOp::Get) => false,
            _ => true,
        }
    }
}

/// Get the name of an interface with any security marker stripped.
pub fn interface_name(desc: InterfaceDesc) -> &'static str {
    let name = desc.first().copied().unwrap_or_default();

    match name.as_bytes().first() {
        Some(&SECURE_ON) | Some(&SECURE_OFF) => &name[1..],
        _ => name,
    }
}

/// Test if the interface carries the secure marker.
pub fn is_secure(desc: InterfaceDesc) -> bool {
    desc.first()
        .map(|name| name.as_bytes().first() == Some(&SECURE_ON))
        .unwrap_or(false)
}

/// Get the kind of a member encoding.
pub fn member_kind(member: &str) -> Option<MemberKind> {
    MemberKind::from_marker(*member.as_bytes().first()?)
}

/// Get the name of a member encoding: the characters after the kind marker
/// up to the first space, direction or access marker.
pub fn member_name(member: &str) -> &str {
    let bytes = member.as_bytes();
    let mut n = 1;

    while n < bytes.len() {
        if matches!(bytes[n], b' ' | b'<' | b'>' | b'=') {
            break;
        }

        n += 1;
    }

    &member[1..n]
}

/// Scanner yielding the type-signature bytes of every argument declared with
/// the requested direction, in declaration order.
struct SigScan<'a> {
    bytes: &'a [u8],
    pos: usize,
    marker: u8,
    in_run: bool,
}

impl<'a> SigScan<'a> {
    fn new(member: &'a str, direction: ArgDirection) -> Self {
        Self {
            bytes: member.as_bytes(),
            pos: 0,
            marker: direction.marker(),
            in_run: false,
        }
    }
}

impl Iterator for SigScan<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            let b = *self.bytes.get(self.pos)?;
            self.pos += 1;

            if self.in_run {
                if b == b' ' {
                    self.in_run = false;
                    continue;
                }

                return Some(b);
            }

            if b == self.marker {
                self.in_run = true;
            }
        }
    }
}

/// Compose the signature of a member for the given direction by
/// concatenating the type tokens that follow every matching direction
/// marker.
pub fn compose_signature(member: &str, direction: ArgDirection) -> Result<SignatureBuf> {
    let mut out = SignatureBuf::empty();

    for b in SigScan::new(member, direction) {
        if !out.try_push(b) {
            return Err(Error::new(ErrorKind::Resources));
        }
    }

    Ok(out)
}

/// Check an actual signature against the member's declared shape for the
/// given direction.
///
/// Fails with a signature mismatch the first time a character differs, and
/// requires both the declaration and `actual` to be exhausted together so
/// trailing extra arguments on either side are detected.
pub fn check_signature(member: &str, direction: ArgDirection, actual: &Signature) -> Result<()> {
    let mut scan = SigScan::new(member, direction);
    let mut actual = actual.as_bytes().iter().copied();

    loop {
        match (scan.next(), actual.next()) {
            (Some(a), Some(b)) if a == b => {}
            (None, None) => return Ok(()),
            _ => return Err(Error::new(ErrorKind::SignatureMismatch)),
        }
    }
}

/// Get the access rights of a property member from its access marker.
pub fn property_access(member: &str) -> Option<PropAccess> {
    let bytes = member.as_bytes();

    if bytes.first() != Some(&b'@') {
        return None;
    }

    for &b in &bytes[1..] {
        match b {
            b'<' => return Some(PropAccess::Write),
            b'>' => return Some(PropAccess::Read),
            b'=' => return Some(PropAccess::ReadWrite),
            _ => {}
        }
    }

    None
}

/// Get the single type signature of a property member, checking that the
/// declared access rights permit the operation.
///
/// A GET on a write-only property or a SET on a read-only property is
/// rejected with `Disallowed` before any marshaling happens.
pub fn property_signature(member: &str, op: PropOp) -> Result<SignatureBuf> {
    let Some(access) = property_access(member) else {
        return Err(Error::new(ErrorKind::Invalid));
    };

    if !access.allows(op) {
        return Err(Error::new(ErrorKind::Disallowed));
    }

    let bytes = member.as_bytes();

    let Some(n) = bytes.iter().position(|&b| matches!(b, b'<' | b'>' | b'=')) else {
        return Err(Error::new(ErrorKind::Invalid));
    };

    let mut out = SignatureBuf::empty();

    if !out.try_extend(&bytes[n + 1..]) {
        return Err(Error::new(ErrorKind::Resources));
    }

    Ok(out)
}

/// Find a member of the given kind and name inside an interface, returning
/// its index and encoding.
pub fn find_member(
    desc: InterfaceDesc,
    kind: MemberKind,
    name: &str,
) -> Option<(usize, &'static str)> {
    for (n, member) in desc.iter().enumerate().skip(1) {
        if member_kind(member) == Some(kind) && member_name(member) == name {
            // Member indices do not count the interface name element.
            return Some((n - 1, member));
        }
    }

    None
}
