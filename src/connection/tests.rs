use std::time::Duration;

use crate::arg::{Arg, ContainerKind};
use crate::bus;
use crate::iface::InterfaceDesc;
use crate::ident::{MsgId, Object};
use crate::msg::{MsgInfo, MsgKind};
use crate::protocol::Flags;
use crate::transport::{MemTransport, Transport};
use crate::{Connection, Signature};

const TIMEOUT: Duration = Duration::from_millis(100);

const CODEC: InterfaceDesc = &[
    "org.test.Codec",
    "?SetMap map<a{us}",
    "?Nested data<u(usu(ii)qsq)yyy",
    "?Rows rows<a(usay)",
    "?Names names<aas",
    "?Mix a<i b<v c<i",
    "?Quad q<(vvvv)",
    "?Blob id<u count<q data<ay",
    "?Grid cells<a(uuuu)",
    "?Echo in<s out>s",
    "!Moved pos>u",
];

static OBJECTS: &[Object] = &[Object {
    path: "/codec",
    interfaces: &[CODEC],
}];

const LOCKED: InterfaceDesc = &["$org.test.Locked", "?Knock"];
const LOCKED_PLAIN: InterfaceDesc = &["#org.test.Locked", "?Knock"];

static LOCKED_LOCAL: &[Object] = &[Object {
    path: "/locked",
    interfaces: &[LOCKED],
}];

static LOCKED_PROXY: &[Object] = &[Object {
    path: "/locked",
    interfaces: &[LOCKED_PLAIN],
}];

fn sig(s: &str) -> &Signature {
    Signature::new(s.as_bytes()).unwrap()
}

fn pair() -> (Connection<MemTransport>, Connection<MemTransport>) {
    let (a, b) = MemTransport::pair();
    let mut client = Connection::new(a);
    let mut server = Connection::new(b);
    client.register_objects(&[], OBJECTS);
    server.register_objects(OBJECTS, &[]);
    (client, server)
}

fn receive(server: &mut Connection<MemTransport>) -> (MsgInfo, MsgId) {
    let mut info = server.unmarshal_msg(TIMEOUT).unwrap();
    let id = server.identify_msg(&mut info).unwrap();
    (info, id)
}

#[test]
fn dict_round_trip() {
    let (mut client, mut server) = pair();
    let entries = [(1u32, "one"), (2, "two"), (3, "three")];

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 0),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let array = client.marshal_container(ContainerKind::Array).unwrap();

    for (key, value) in entries {
        let entry = client.marshal_container(ContainerKind::DictEntry).unwrap();
        client
            .marshal_args(&[Arg::Uint32(key), Arg::Str(value)])
            .unwrap();
        client.marshal_close_container(entry).unwrap();
    }

    client.marshal_close_container(array).unwrap();
    client.deliver_msg().unwrap();

    let (info, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 0));
    assert_eq!(info.signature.as_bytes(), b"a{us}");

    let array = server.unmarshal_container(ContainerKind::Array).unwrap();
    let mut seen = Vec::new();

    loop {
        let entry = match server.unmarshal_container(ContainerKind::DictEntry) {
            Ok(entry) => entry,
            Err(e) => {
                assert!(e.is_no_more());
                break;
            }
        };

        let key = match server.unmarshal_arg().unwrap() {
            Arg::Uint32(v) => v,
            arg => panic!("unexpected key: {arg:?}"),
        };

        let value = match server.unmarshal_arg().unwrap() {
            Arg::Str(v) => v.to_owned(),
            arg => panic!("unexpected value: {arg:?}"),
        };

        server.unmarshal_close_container(entry).unwrap();
        seen.push((key, value));
    }

    server.unmarshal_close_container(array).unwrap();
    server.close_msg().unwrap();

    let expected = entries
        .iter()
        .map(|&(k, v)| (k, v.to_owned()))
        .collect::<Vec<_>>();
    assert_eq!(seen, expected);
}

#[test]
fn nested_struct_round_trip() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 1),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    client.marshal_args(&[Arg::Uint32(4)]).unwrap();
    let outer = client.marshal_container(ContainerKind::Struct).unwrap();
    client
        .marshal_args(&[Arg::Uint32(10), Arg::Str("ten"), Arg::Uint32(20)])
        .unwrap();
    let inner = client.marshal_container(ContainerKind::Struct).unwrap();
    client
        .marshal_args(&[Arg::Int32(-1), Arg::Int32(-2)])
        .unwrap();
    client.marshal_close_container(inner).unwrap();
    client
        .marshal_args(&[Arg::Uint16(3), Arg::Str("s"), Arg::Uint16(4)])
        .unwrap();
    client.marshal_close_container(outer).unwrap();
    client
        .marshal_args(&[Arg::Byte(7), Arg::Byte(8), Arg::Byte(9)])
        .unwrap();
    client.deliver_msg().unwrap();

    let (info, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 1));
    assert_eq!(info.signature.as_bytes(), b"u(usu(ii)qsq)yyy");

    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(4));
    let outer = server.unmarshal_container(ContainerKind::Struct).unwrap();
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(10));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("ten"));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(20));
    let inner = server.unmarshal_container(ContainerKind::Struct).unwrap();
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Int32(-1));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Int32(-2));
    server.unmarshal_close_container(inner).unwrap();
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint16(3));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("s"));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint16(4));
    server.unmarshal_close_container(outer).unwrap();
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Byte(7));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Byte(8));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Byte(9));
    server.close_msg().unwrap();
}

#[test]
fn struct_array_round_trip() {
    let (mut client, mut server) = pair();
    let rows: &[(u32, &str, &[u8])] = &[(1, "a", &[1]), (2, "bb", &[]), (3, "ccc", &[1, 2, 3])];

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 2),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let array = client.marshal_container(ContainerKind::Array).unwrap();

    for &(id, name, data) in rows {
        let row = client.marshal_container(ContainerKind::Struct).unwrap();
        client
            .marshal_args(&[Arg::Uint32(id), Arg::Str(name), Arg::ByteArray(data)])
            .unwrap();
        client.marshal_close_container(row).unwrap();
    }

    client.marshal_close_container(array).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"a(usay)");

    let array = server.unmarshal_container(ContainerKind::Array).unwrap();

    for &(id, name, data) in rows {
        let row = server.unmarshal_container(ContainerKind::Struct).unwrap();
        assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(id));
        assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str(name));
        assert_eq!(server.unmarshal_arg().unwrap(), Arg::ByteArray(data));
        server.unmarshal_close_container(row).unwrap();
    }

    let e = server
        .unmarshal_container(ContainerKind::Struct)
        .unwrap_err();
    assert!(e.is_no_more());

    server.unmarshal_close_container(array).unwrap();
    server.close_msg().unwrap();
}

#[test]
fn string_matrix_round_trip() {
    let (mut client, mut server) = pair();
    let matrix: &[&[&str]] = &[&["a", "b"], &[], &["c"]];

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 3),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let outer = client.marshal_container(ContainerKind::Array).unwrap();

    for row in matrix {
        let inner = client.marshal_container(ContainerKind::Array).unwrap();

        for s in *row {
            client.marshal_args(&[Arg::Str(s)]).unwrap();
        }

        client.marshal_close_container(inner).unwrap();
    }

    client.marshal_close_container(outer).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"aas");

    let outer = server.unmarshal_container(ContainerKind::Array).unwrap();

    for row in matrix {
        let inner = server.unmarshal_container(ContainerKind::Array).unwrap();

        for s in *row {
            assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str(s));
        }

        assert!(server.unmarshal_arg().unwrap_err().is_no_more());
        server.unmarshal_close_container(inner).unwrap();
    }

    let e = server
        .unmarshal_container(ContainerKind::Array)
        .unwrap_err();
    assert!(e.is_no_more());

    server.unmarshal_close_container(outer).unwrap();
    server.close_msg().unwrap();
}

#[test]
fn variant_between_args() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 4),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    client.marshal_args(&[Arg::Int32(1)]).unwrap();
    client.marshal_variant(sig("d")).unwrap();
    client.marshal_args(&[Arg::Double(2.5)]).unwrap();
    client.marshal_args(&[Arg::Int32(3)]).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"ivi");

    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Int32(1));
    let v = server.unmarshal_variant().unwrap();
    assert_eq!(v.as_bytes(), b"d");
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Double(2.5));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Int32(3));
    server.close_msg().unwrap();
}

#[test]
fn variants_in_struct() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 5),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let quad = client.marshal_container(ContainerKind::Struct).unwrap();
    client.marshal_variant(sig("y")).unwrap();
    client.marshal_args(&[Arg::Byte(1)]).unwrap();
    client.marshal_variant(sig("s")).unwrap();
    client.marshal_args(&[Arg::Str("two")]).unwrap();
    client.marshal_variant(sig("u")).unwrap();
    client.marshal_args(&[Arg::Uint32(3)]).unwrap();
    client.marshal_variant(sig("t")).unwrap();
    client.marshal_args(&[Arg::Uint64(4)]).unwrap();
    client.marshal_close_container(quad).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"(vvvv)");

    let quad = server.unmarshal_container(ContainerKind::Struct).unwrap();
    assert_eq!(server.unmarshal_variant().unwrap().as_bytes(), b"y");
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Byte(1));
    assert_eq!(server.unmarshal_variant().unwrap().as_bytes(), b"s");
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("two"));
    assert_eq!(server.unmarshal_variant().unwrap().as_bytes(), b"u");
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(3));
    assert_eq!(server.unmarshal_variant().unwrap().as_bytes(), b"t");
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint64(4));
    server.unmarshal_close_container(quad).unwrap();
    server.close_msg().unwrap();
}

#[test]
fn multi_arg_run() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 6),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    client
        .marshal_args(&[Arg::Uint32(7), Arg::Uint16(3), Arg::ByteArray(&[1, 2, 3])])
        .unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"uqay");

    let mut out = [Arg::Byte(0); 3];
    server.unmarshal_args(&mut out).unwrap();
    assert_eq!(
        out,
        [Arg::Uint32(7), Arg::Uint16(3), Arg::ByteArray(&[1, 2, 3])]
    );
    server.close_msg().unwrap();
}

#[test]
fn close_skips_unread_content() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 7),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let array = client.marshal_container(ContainerKind::Array).unwrap();

    for n in 0..3u32 {
        let cell = client.marshal_container(ContainerKind::Struct).unwrap();
        client
            .marshal_args(&[
                Arg::Uint32(n),
                Arg::Uint32(n + 1),
                Arg::Uint32(n + 2),
                Arg::Uint32(n + 3),
            ])
            .unwrap();
        client.marshal_close_container(cell).unwrap();
    }

    client.marshal_close_container(array).unwrap();
    client.deliver_msg().unwrap();

    let (_, _) = receive(&mut server);

    // Read the first struct, abandon the second one early, leave the third
    // on the wire entirely.
    let array = server.unmarshal_container(ContainerKind::Array).unwrap();

    let cell = server.unmarshal_container(ContainerKind::Struct).unwrap();
    let mut out = [Arg::Byte(0); 4];
    server.unmarshal_args(&mut out).unwrap();
    assert_eq!(out[0], Arg::Uint32(0));
    server.unmarshal_close_container(cell).unwrap();

    let cell = server.unmarshal_container(ContainerKind::Struct).unwrap();
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Uint32(1));
    server.unmarshal_close_container(cell).unwrap();

    server.unmarshal_close_container(array).unwrap();
    server.close_msg().unwrap();

    // The stream stays aligned for the next message.
    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client.marshal_args(&[Arg::Str("still here")]).unwrap();
    client.deliver_msg().unwrap();

    let (_, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 8));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("still here"));
    server.close_msg().unwrap();
}

#[test]
fn call_reply_correlation() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.marshal_args(&[Arg::Str("ping")]).unwrap();
    client.deliver_msg().unwrap();

    let (info, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 8));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("ping"));
    server.close_msg().unwrap();

    server.marshal_reply(&info).unwrap();
    server.marshal_args(&[Arg::Str("pong")]).unwrap();
    server.deliver_msg().unwrap();

    let mut reply = client.unmarshal_msg(TIMEOUT).unwrap();
    assert!(matches!(reply.kind, MsgKind::MethodReturn { .. }));
    let id = client.identify_msg(&mut reply).unwrap();
    assert_eq!(id, MsgId::proxy(0, 0, 8).as_reply());
    assert_eq!(client.unmarshal_arg().unwrap(), Arg::Str("pong"));
    client.close_msg().unwrap();
}

#[test]
fn signal_identifies_through_proxy_table() {
    let (mut client, mut server) = pair();

    server
        .marshal_signal(MsgId::local(0, 0, 9), None, 0, Flags::EMPTY, Some(1000))
        .unwrap();
    server.marshal_args(&[Arg::Uint32(42)]).unwrap();
    server.deliver_msg().unwrap();

    let mut info = client.unmarshal_msg(TIMEOUT).unwrap();
    assert!(matches!(info.kind, MsgKind::Signal { .. }));
    assert_eq!(info.ttl, Some(1000));
    assert!(info.timestamp.is_some());

    let id = client.identify_msg(&mut info).unwrap();
    assert_eq!(id, MsgId::proxy(0, 0, 9));
    assert_eq!(client.unmarshal_arg().unwrap(), Arg::Uint32(42));
    client.close_msg().unwrap();
}

#[test]
fn reply_pool_exhaustion() {
    let (mut client, _server) = pair();

    for _ in 0..2 {
        client
            .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
            .unwrap();
        client.marshal_args(&[Arg::Str("x")]).unwrap();
        client.deliver_msg().unwrap();
    }

    let e = client
        .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
        .unwrap_err();
    assert!(e.is_resources());
}

#[test]
fn cancel_releases_reply_slot() {
    let (mut client, _server) = pair();

    for _ in 0..2 {
        client
            .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
            .unwrap();
        client.cancel_msg().unwrap();
    }

    for _ in 0..2 {
        client
            .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
            .unwrap();
        client.marshal_args(&[Arg::Str("x")]).unwrap();
        client.deliver_msg().unwrap();
    }
}

#[test]
fn call_timeout_synthesizes_error() {
    let (mut client, _server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            None,
            0,
            Flags::EMPTY,
            Some(Duration::ZERO),
        )
        .unwrap();
    client.marshal_args(&[Arg::Str("slow")]).unwrap();
    client.deliver_msg().unwrap();

    let mut info = client.unmarshal_msg(TIMEOUT).unwrap();

    let MsgKind::Error {
        error_name,
        reply_serial,
    } = &info.kind
    else {
        panic!("expected error: {:?}", info.kind);
    };

    assert_eq!(&**error_name, bus::ERROR_TIMEOUT);
    assert_eq!(*reply_serial, 1);

    let id = client.identify_msg(&mut info).unwrap();
    assert_eq!(id, MsgId::proxy(0, 0, 8).as_reply());
}

#[test]
fn buffered_reply_beats_expired_deadline() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            None,
            0,
            Flags::EMPTY,
            Some(Duration::from_millis(1)),
        )
        .unwrap();
    client.marshal_args(&[Arg::Str("ping")]).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    server.close_msg().unwrap();
    server.marshal_reply(&info).unwrap();
    server.marshal_args(&[Arg::Str("pong")]).unwrap();
    server.deliver_msg().unwrap();

    // The deadline has long passed, but the reply is already on the wire
    // and wins over the local timeout.
    std::thread::sleep(Duration::from_millis(5));

    let mut info = client.unmarshal_msg(TIMEOUT).unwrap();
    assert!(matches!(&info.kind, MsgKind::MethodReturn { reply_serial: 1 }));

    let id = client.identify_msg(&mut info).unwrap();
    assert_eq!(id, MsgId::proxy(0, 0, 8).as_reply());
    assert_eq!(client.unmarshal_arg().unwrap(), Arg::Str("pong"));
    client.close_msg().unwrap();

    // The slot was released by the reply, so an idle wire is just a timeout.
    let err = client.unmarshal_msg(Duration::ZERO).unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn malformed_message_is_discarded_whole() {
    let (mut wire, peer) = MemTransport::pair();
    let mut server = Connection::new(peer);
    server.register_objects(OBJECTS, &[]);

    // A length-sound method call carrying a path but no member, followed
    // by a four byte body.
    let mut msg = Vec::new();
    msg.extend_from_slice(&[b'l', 1, 0, 1]);
    msg.extend_from_slice(&4u32.to_le_bytes());
    msg.extend_from_slice(&9u32.to_le_bytes());
    msg.extend_from_slice(&13u32.to_le_bytes());
    msg.extend_from_slice(&[1, 1, b'o', 0]);
    msg.extend_from_slice(&4u32.to_le_bytes());
    msg.extend_from_slice(b"/mal\0");
    msg.extend_from_slice(&[0, 0, 0]);
    msg.extend_from_slice(&[0xaa; 4]);
    wire.send(&msg).unwrap();

    let mut client = Connection::new(&mut wire);
    client.register_objects(&[], OBJECTS);
    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client.marshal_args(&[Arg::Str("still here")]).unwrap();
    client.deliver_msg().unwrap();
    drop(client);

    // The malformed message is rejected, and its unread remainder does not
    // shift the stream off the next fixed header.
    assert!(server.unmarshal_msg(TIMEOUT).is_err());

    let (_, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 8));
    assert_eq!(server.unmarshal_arg().unwrap(), Arg::Str("still here"));
    server.close_msg().unwrap();
}

#[test]
fn partial_delivery() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 6),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client
        .marshal_args(&[Arg::Uint32(7), Arg::Uint16(3)])
        .unwrap();

    // 2 bytes of array padding, the 4-byte length, 3 bytes of data.
    client.deliver_msg_partial(9).unwrap();
    client.marshal_raw(&[0, 0]).unwrap();
    client.marshal_raw(&3u32.to_ne_bytes()).unwrap();
    client.marshal_raw(&[1, 2, 3]).unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.body_len, 15);

    let mut out = [Arg::Byte(0); 3];
    server.unmarshal_args(&mut out).unwrap();
    assert_eq!(
        out,
        [Arg::Uint32(7), Arg::Uint16(3), Arg::ByteArray(&[1, 2, 3])]
    );
    server.close_msg().unwrap();
}

#[test]
fn deliver_rejects_unfinished_body() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 4),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client.marshal_args(&[Arg::Int32(1)]).unwrap();
    assert!(client.deliver_msg().is_err());

    // The message survives the failed delivery and can be completed.
    client.marshal_variant(sig("y")).unwrap();
    client.marshal_args(&[Arg::Byte(2)]).unwrap();
    client.marshal_args(&[Arg::Int32(3)]).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.signature.as_bytes(), b"ivi");
}

#[test]
fn signature_mismatch_rejected_at_marshal() {
    let (mut client, _server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();

    let e = client.marshal_args(&[Arg::Uint32(1)]).unwrap_err();
    assert!(e.is_signature_mismatch());

    client.cancel_msg().unwrap();
}

#[test]
fn unknown_member_answered_with_service_unknown() {
    let (a, b) = MemTransport::pair();
    let mut client = Connection::new(a);
    let mut server = Connection::new(b);
    client.register_objects(&[], OBJECTS);

    client
        .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.marshal_args(&[Arg::Str("hello")]).unwrap();
    client.deliver_msg().unwrap();

    let mut info = server.unmarshal_msg(TIMEOUT).unwrap();
    assert!(server.identify_msg(&mut info).is_err());
    server.close_msg().unwrap();

    let mut reply = client.unmarshal_msg(TIMEOUT).unwrap();

    let MsgKind::Error { error_name, .. } = &reply.kind else {
        panic!("expected error: {:?}", reply.kind);
    };

    assert_eq!(&**error_name, bus::ERROR_SERVICE_UNKNOWN);

    let id = client.identify_msg(&mut reply).unwrap();
    assert_eq!(id, MsgId::proxy(0, 0, 8).as_reply());
}

#[test]
fn unencrypted_call_to_secure_interface_rejected() {
    let (a, b) = MemTransport::pair();
    let mut client = Connection::new(a);
    let mut server = Connection::new(b);
    client.register_objects(&[], LOCKED_PROXY);
    server.register_objects(LOCKED_LOCAL, &[]);

    client
        .marshal_method_call(MsgId::proxy(0, 0, 0), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.deliver_msg().unwrap();

    let mut info = server.unmarshal_msg(TIMEOUT).unwrap();
    assert!(server.identify_msg(&mut info).is_err());

    let mut reply = client.unmarshal_msg(TIMEOUT).unwrap();

    let MsgKind::Error { error_name, .. } = &reply.kind else {
        panic!("expected error: {:?}", reply.kind);
    };

    assert_eq!(&**error_name, bus::ERROR_SECURITY_VIOLATION);
    client.identify_msg(&mut reply).unwrap();
}

#[test]
fn secure_proxy_call_sets_encrypted_flag() {
    let (a, b) = MemTransport::pair();
    let mut client = Connection::new(a);
    let mut server = Connection::new(b);
    client.register_objects(&[], LOCKED_LOCAL);
    server.register_objects(LOCKED_LOCAL, &[]);

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 0),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client.deliver_msg().unwrap();

    let (info, id) = receive(&mut server);
    assert_eq!(id, MsgId::local(0, 0, 0));
    assert!(info.flags & Flags::ENCRYPTED);
}

#[test]
fn introspect_round_trip() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(MsgId::bus(0, 0, 0), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.deliver_msg().unwrap();

    let (info, id) = receive(&mut server);
    assert_eq!(id, MsgId::bus(0, 0, 0));
    server.introspect(&info).unwrap();

    let mut reply = client.unmarshal_msg(TIMEOUT).unwrap();
    let id = client.identify_msg(&mut reply).unwrap();
    assert_eq!(id, MsgId::bus(0, 0, 0).as_reply());

    let Arg::Str(doc) = client.unmarshal_arg().unwrap() else {
        panic!("expected string body");
    };

    assert!(doc.contains("org.freedesktop.DBus.Introspectable"));
    assert!(doc.contains("<method name=\"Introspect\">"));
    assert!(doc.contains("org.freedesktop.DBus.Peer"));
}

#[test]
fn session_and_destination_fields_round_trip() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 8),
            Some(":1.42"),
            7,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client.marshal_args(&[Arg::Str("hi")]).unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    assert_eq!(info.destination.as_deref(), Some(":1.42"));
    assert_eq!(info.session_id, 7);
    assert!(info.flags & Flags::NO_REPLY_EXPECTED);
    server.close_msg().unwrap();
}

#[test]
fn raw_body_access() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(
            MsgId::proxy(0, 0, 6),
            None,
            0,
            Flags::NO_REPLY_EXPECTED,
            None,
        )
        .unwrap();
    client
        .marshal_args(&[Arg::Uint32(7), Arg::Uint16(3), Arg::ByteArray(&[9, 9])])
        .unwrap();
    client.deliver_msg().unwrap();

    let (info, _) = receive(&mut server);
    let body_len = info.body_len as usize;
    let mut total = 0;

    while total < body_len {
        let chunk = server.unmarshal_raw(body_len - total).unwrap();
        assert!(!chunk.is_empty());
        total += chunk.len();
    }

    assert_eq!(total, body_len);
    assert!(server.unmarshal_raw(1).unwrap_err().is_no_more());
    server.close_msg().unwrap();
}

#[test]
fn disconnect_resets_everything() {
    let (mut client, mut server) = pair();

    client
        .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.marshal_args(&[Arg::Str("x")]).unwrap();
    client.deliver_msg().unwrap();

    let (_, _) = receive(&mut server);

    client.disconnect();
    server.disconnect();

    // Registrations are gone; the same inbound call no longer matches.
    client.register_objects(&[], OBJECTS);
    client
        .marshal_method_call(MsgId::proxy(0, 0, 8), None, 0, Flags::EMPTY, None)
        .unwrap();
    client.marshal_args(&[Arg::Str("x")]).unwrap();
    client.deliver_msg().unwrap();

    let mut info = server.unmarshal_msg(TIMEOUT).unwrap();
    assert!(server.identify_msg(&mut info).is_err());
}
