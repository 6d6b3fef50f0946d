//! Well-known bus names and the built-in object table.
//!
//! Interfaces here use the same compact encoding as application-registered
//! ones and are consulted first during identification, so standard calls
//! such as `Introspect` resolve without any registration.

use crate::iface::InterfaceDesc;
use crate::ident::Object;

/// Error name replied when no registered member matches an inbound call.
pub const ERROR_SERVICE_UNKNOWN: &str = "org.alljoyn.Bus.ServiceUnknown";

/// Error name replied when a call violates the security policy of a
/// registered interface.
pub const ERROR_SECURITY_VIOLATION: &str = "org.alljoyn.Bus.SecurityViolation";

/// Error name synthesized locally when a pending reply times out.
pub const ERROR_TIMEOUT: &str = "org.alljoyn.Bus.Timeout";

/// `org.freedesktop.DBus.Introspectable`.
pub const INTROSPECTABLE: InterfaceDesc = &[
    "#org.freedesktop.DBus.Introspectable",
    "?Introspect data>s",
];

/// `org.freedesktop.DBus.Properties`.
pub const PROPERTIES: InterfaceDesc = &[
    "#org.freedesktop.DBus.Properties",
    "?Get iface<s prop<s value>v",
    "?Set iface<s prop<s value<v",
    "?GetAll iface<s values>a{sv}",
];

/// `org.freedesktop.DBus.Peer`.
pub const PEER: InterfaceDesc = &["#org.freedesktop.DBus.Peer", "?Ping", "?GetMachineId id>s"];

/// Interfaces implemented by every object.
pub(crate) const COMMON_INTERFACES: &[InterfaceDesc] = &[INTROSPECTABLE, PEER];

/// The built-in bus object table.
pub(crate) const BUS_OBJECTS: &[Object] = &[Object {
    path: "*",
    interfaces: COMMON_INTERFACES,
}];
