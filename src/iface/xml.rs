//! Introspection XML rendering.
//!
//! Expands the compact interface encoding back into the standard
//! `org.freedesktop.DBus.Introspectable` document format.

use std::fmt::Write;

use crate::bus;
use crate::iface::{self, InterfaceDesc, MemberKind, PropAccess};
use crate::ident::{ObjectTables, Table};

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

/// Render the introspection document for the node at `path`.
///
/// The document lists the interfaces of the local object registered at the
/// path, the interfaces common to all objects, and one child `<node>`
/// element per distinct next path segment of registered objects below it.
pub(crate) fn introspect_node(tables: &ObjectTables, path: &str) -> String {
    let mut out = String::from(DOCTYPE);
    out.push_str("<node>\n");

    for object in tables.table(Table::Local) {
        if object.path == path {
            for desc in object.interfaces {
                render_interface(&mut out, desc);
            }
        }
    }

    for desc in bus::COMMON_INTERFACES {
        render_interface(&mut out, desc);
    }

    render_children(&mut out, tables, path);

    out.push_str("</node>\n");
    out
}

fn render_children(out: &mut String, tables: &ObjectTables, path: &str) {
    let mut seen: Vec<&str> = Vec::new();

    for object in tables.table(Table::Local) {
        if object.path == "*" || object.path == path {
            continue;
        }

        let child = match object.path.strip_prefix(path) {
            Some(rest) if path == "/" => rest,
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => continue,
        };

        let segment = match child.find('/') {
            Some(n) => &child[..n],
            None => child,
        };

        if segment.is_empty() || seen.contains(&segment) {
            continue;
        }

        seen.push(segment);
        _ = writeln!(out, "  <node name=\"{segment}\"/>");
    }
}

fn render_interface(out: &mut String, desc: InterfaceDesc) {
    _ = writeln!(out, "  <interface name=\"{}\">", iface::interface_name(desc));

    for member in &desc[1..] {
        match iface::member_kind(member) {
            Some(MemberKind::Method) => render_member(out, member, "method", true),
            Some(MemberKind::Signal) => render_member(out, member, "signal", false),
            Some(MemberKind::Property) => render_property(out, member),
            None => {}
        }
    }

    out.push_str("  </interface>\n");
}

fn render_member(out: &mut String, member: &str, element: &str, directions: bool) {
    let name = iface::member_name(member);
    let mut tokens = member.split(' ');
    // Skip the marker and name token.
    tokens.next();

    let mut args = tokens.peekable();

    if args.peek().is_none() {
        _ = writeln!(out, "    <{element} name=\"{name}\"/>");
        return;
    }

    _ = writeln!(out, "    <{element} name=\"{name}\">");

    for arg in args {
        let Some(n) = arg.find(['<', '>']) else {
            continue;
        };

        let (arg_name, rest) = arg.split_at(n);
        let ty = &rest[1..];

        if directions {
            let direction = if rest.starts_with('<') { "in" } else { "out" };
            _ = writeln!(
                out,
                "      <arg name=\"{arg_name}\" type=\"{ty}\" direction=\"{direction}\"/>"
            );
        } else {
            _ = writeln!(out, "      <arg name=\"{arg_name}\" type=\"{ty}\"/>");
        }
    }

    _ = writeln!(out, "    </{element}>");
}

fn render_property(out: &mut String, member: &str) {
    let name = iface::member_name(member);

    let access = match iface::property_access(member) {
        Some(PropAccess::Write) => "write",
        Some(PropAccess::Read) => "read",
        Some(PropAccess::ReadWrite) => "readwrite",
        None => return,
    };

    let Some(n) = member.find(['<', '>', '=']) else {
        return;
    };

    let ty = &member[n + 1..];

    _ = writeln!(
        out,
        "    <property name=\"{name}\" type=\"{ty}\" access=\"{access}\"/>"
    );
}
