//! End-to-end exercise of the public API, modeled on the classic `cat`
//! sample service: a method that concatenates its two string arguments.

use std::time::Duration;

use anyhow::{bail, Result};

use alljoyn_thin::{
    Arg, Connection, Flags, InterfaceDesc, MemTransport, MsgId, MsgKind, Object,
};

const TIMEOUT: Duration = Duration::from_millis(100);

const SAMPLE: InterfaceDesc = &[
    "org.alljoyn.Bus.sample",
    "?Dummy foo<i",
    "?Dummy2 fee<i",
    "?cat inStr1<s inStr2<s outStr>s",
];

static OBJECTS: &[Object] = &[Object {
    path: "/sample",
    interfaces: &[SAMPLE],
}];

const CAT: u8 = 2;

fn pair() -> (Connection<MemTransport>, Connection<MemTransport>) {
    let (a, b) = MemTransport::pair();
    let mut client = Connection::new(a);
    let mut server = Connection::new(b);
    client.register_objects(&[], OBJECTS);
    server.register_objects(OBJECTS, &[]);
    (client, server)
}

fn expect_str(arg: Arg<'_>) -> Result<String> {
    match arg {
        Arg::Str(s) => Ok(s.to_owned()),
        arg => bail!("expected string argument, got {arg:?}"),
    }
}

#[test]
fn cat_service() -> Result<()> {
    let (mut client, mut server) = pair();

    client.marshal_method_call(MsgId::proxy(0, 0, CAT), None, 0, Flags::EMPTY, None)?;
    client.marshal_args(&[Arg::Str("Hello "), Arg::Str("World!")])?;
    client.deliver_msg()?;

    // Service side: dispatch on the packed id and answer.
    let mut info = server.unmarshal_msg(TIMEOUT)?;
    let id = server.identify_msg(&mut info)?;
    assert_eq!(id, MsgId::local(0, 0, CAT));
    assert_eq!(info.member(), Some("cat"));
    assert_eq!(info.path(), Some("/sample"));
    assert_eq!(info.interface.as_deref(), Some("org.alljoyn.Bus.sample"));

    let first = expect_str(server.unmarshal_arg()?)?;
    let second = expect_str(server.unmarshal_arg()?)?;
    server.close_msg()?;

    let out = format!("{first}{second}");
    server.marshal_reply(&info)?;
    server.marshal_args(&[Arg::Str(&out)])?;
    server.deliver_msg()?;

    // Client side: the reply correlates back to the original call.
    let mut reply = client.unmarshal_msg(TIMEOUT)?;
    assert!(matches!(reply.kind, MsgKind::MethodReturn { .. }));

    let id = client.identify_msg(&mut reply)?;
    assert_eq!(id, MsgId::proxy(0, 0, CAT).as_reply());
    assert_eq!(client.unmarshal_arg()?, Arg::Str("Hello World!"));
    client.close_msg()?;
    Ok(())
}

#[test]
fn unsolicited_reply_is_rejected() -> Result<()> {
    let (mut client, mut server) = pair();

    client.marshal_method_call(
        MsgId::proxy(0, 0, CAT),
        None,
        0,
        Flags::NO_REPLY_EXPECTED,
        None,
    )?;
    client.marshal_args(&[Arg::Str("a"), Arg::Str("b")])?;
    client.deliver_msg()?;

    let mut info = server.unmarshal_msg(TIMEOUT)?;
    server.identify_msg(&mut info)?;
    server.close_msg()?;

    // The service answers even though no reply was requested; the client
    // has no pending context for it.
    server.marshal_reply(&info)?;
    server.marshal_args(&[Arg::Str("ab")])?;
    server.deliver_msg()?;

    let mut reply = client.unmarshal_msg(TIMEOUT)?;
    assert!(client.identify_msg(&mut reply).is_err());
    Ok(())
}
