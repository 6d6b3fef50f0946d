use super::*;
use crate::ident::{Object, ObjectTables};
use crate::Signature;

const SAMPLE: InterfaceDesc = &[
    "org.alljoyn.Bus.sample",
    "?Dummy foo<i",
    "?Dummy2 fee<i",
    "?cat inStr1<s inStr2<s outStr>s",
];

const SECURE: InterfaceDesc = &["$org.alljoyn.Bus.locked", "?Knock"];

const MIXED: InterfaceDesc = &[
    "#org.alljoyn.Bus.mixed",
    "?Seek pos<x whence<i newPos>x",
    "!Moved oldPos>x newPos>x",
    "@Size=t",
    "@Secret<s",
    "@Version>u",
];

#[test]
fn names_and_markers() {
    assert_eq!(interface_name(SAMPLE), "org.alljoyn.Bus.sample");
    assert_eq!(interface_name(SECURE), "org.alljoyn.Bus.locked");
    assert_eq!(interface_name(MIXED), "org.alljoyn.Bus.mixed");

    assert!(!is_secure(SAMPLE));
    assert!(is_secure(SECURE));
    assert!(!is_secure(MIXED));

    assert_eq!(member_kind("?cat a<s"), Some(MemberKind::Method));
    assert_eq!(member_kind("!Moved a>x"), Some(MemberKind::Signal));
    assert_eq!(member_kind("@Size=t"), Some(MemberKind::Property));
    assert_eq!(member_kind("Size"), None);

    assert_eq!(member_name("?cat inStr1<s"), "cat");
    assert_eq!(member_name("?Knock"), "Knock");
    assert_eq!(member_name("@Size=t"), "Size");
}

#[test]
fn compose() {
    let member = "?cat inStr1<s inStr2<s outStr>s";

    assert_eq!(
        compose_signature(member, ArgDirection::In).unwrap().as_str(),
        "ss"
    );
    assert_eq!(
        compose_signature(member, ArgDirection::Out).unwrap().as_str(),
        "s"
    );

    // Multi-character types stay intact.
    let member = "?map in<a{us} out>a(usay)";
    assert_eq!(
        compose_signature(member, ArgDirection::In).unwrap().as_str(),
        "a{us}"
    );
    assert_eq!(
        compose_signature(member, ArgDirection::Out).unwrap().as_str(),
        "a(usay)"
    );

    // No arguments in the requested direction composes empty.
    assert!(compose_signature("?Knock", ArgDirection::In)
        .unwrap()
        .is_empty());
}

#[test]
fn check() {
    let member = "?cat inStr1<s inStr2<s outStr>s";

    check_signature(member, ArgDirection::In, Signature::new(b"ss").unwrap()).unwrap();
    check_signature(member, ArgDirection::Out, Signature::new(b"s").unwrap()).unwrap();

    // Wrong type.
    let err = check_signature(member, ArgDirection::In, Signature::new(b"si").unwrap()).unwrap_err();
    assert!(err.is_signature_mismatch());

    // Too few and too many arguments.
    assert!(
        check_signature(member, ArgDirection::In, Signature::new(b"s").unwrap()).is_err()
    );
    assert!(
        check_signature(member, ArgDirection::In, Signature::new(b"sss").unwrap()).is_err()
    );
}

#[test]
fn property_members() {
    assert_eq!(property_access("@Size=t"), Some(PropAccess::ReadWrite));
    assert_eq!(property_access("@Secret<s"), Some(PropAccess::Write));
    assert_eq!(property_access("@Version>u"), Some(PropAccess::Read));
    assert_eq!(property_access("?cat a<s"), None);

    assert_eq!(
        property_signature("@Size=t", PropOp::Get).unwrap().as_str(),
        "t"
    );
    assert_eq!(
        property_signature("@Size=t", PropOp::Set).unwrap().as_str(),
        "t"
    );

    // Write-only forbids GET, read-only forbids SET.
    assert!(property_signature("@Secret<s", PropOp::Get).is_err());
    assert_eq!(
        property_signature("@Secret<s", PropOp::Set).unwrap().as_str(),
        "s"
    );
    assert_eq!(
        property_signature("@Version>u", PropOp::Get).unwrap().as_str(),
        "u"
    );
    assert!(property_signature("@Version>u", PropOp::Set).is_err());

    // Not a property.
    assert!(property_signature("?cat a<s", PropOp::Get).is_err());
}

#[test]
fn member_lookup() {
    // Member indices skip the interface name element.
    let (n, member) = find_member(SAMPLE, MemberKind::Method, "cat").unwrap();
    assert_eq!(n, 2);
    assert_eq!(member, "?cat inStr1<s inStr2<s outStr>s");

    let (n, _) = find_member(SAMPLE, MemberKind::Method, "Dummy").unwrap();
    assert_eq!(n, 0);

    assert!(find_member(SAMPLE, MemberKind::Signal, "cat").is_none());
    assert!(find_member(SAMPLE, MemberKind::Method, "dog").is_none());

    let (n, _) = find_member(MIXED, MemberKind::Property, "Size").unwrap();
    assert_eq!(n, 2);
}

#[test]
fn introspection_document() {
    static OBJECTS: &[Object] = &[
        Object {
            path: "/sample",
            interfaces: &[SAMPLE],
        },
        Object {
            path: "/sample/sub/leaf",
            interfaces: &[MIXED],
        },
    ];

    let mut tables = ObjectTables::new(crate::bus::BUS_OBJECTS);
    tables.register(OBJECTS, &[]);

    let doc = introspect_node(&tables, "/sample");

    assert!(doc.contains("<interface name=\"org.alljoyn.Bus.sample\">"));
    assert!(doc.contains(
        "<arg name=\"inStr1\" type=\"s\" direction=\"in\"/>"
    ));
    assert!(doc.contains(
        "<arg name=\"outStr\" type=\"s\" direction=\"out\"/>"
    ));
    // Standard interfaces are always present.
    assert!(doc.contains("org.freedesktop.DBus.Introspectable"));
    // Only the next path segment shows up as a child node.
    assert!(doc.contains("<node name=\"sub\"/>"));
    assert!(!doc.contains("leaf"));

    let doc = introspect_node(&tables, "/sample/sub/leaf");
    assert!(doc.contains(
        "<property name=\"Size\" type=\"t\" access=\"readwrite\"/>"
    ));
    assert!(doc.contains(
        "<property name=\"Secret\" type=\"s\" access=\"write\"/>"
    ));
    assert!(doc.contains("<signal name=\"Moved\">"));
    assert!(doc.contains("<arg name=\"oldPos\" type=\"x\"/>"));
}
