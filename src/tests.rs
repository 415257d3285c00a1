//! Crate-level integration tests: these exercise the marshal/unmarshal
//! layer, the router's dispatch, and the match-rule filter together,
//! rather than any one module in isolation. Unit tests for a given
//! module's own internals live next to it instead.

use std::thread;
use std::time::Duration;

use crate::connection::ll_conn::DuplexConn;
use crate::connection::Timeout;
use crate::match_rule::MatchRule;
use crate::message_builder::{MessageBuilder, MessageType};
use crate::router::BlockingRouter;
use crate::wire::marshal::marshal;
use crate::wire::unmarshal::{unmarshal_dynamic_header, unmarshal_header, unmarshal_next_message};
use crate::wrappers::{self, Address};

fn peer_address() -> Address {
    Address::new("/org/freedesktop/DBus")
        .with_bus_name("org.freedesktop.DBus")
        .with_interface("org.freedesktop.DBus.Peer")
}

/// Marshalling a message and unmarshalling the resulting bytes back must
/// reproduce the same header fields and body signature, independent of
/// how many bytes the reader's buffer happens to hold at once (exercised
/// for the chunked case over in `stream_parser`).
#[test]
fn marshal_then_unmarshal_round_trips_header_and_body() {
    let mut msg = MessageBuilder::new()
        .call("Echo".to_owned())
        .on("/io/example/Obj".to_owned())
        .with_interface("io.example.Iface".to_owned())
        .at("io.example.Service".to_owned())
        .build();
    msg.body.push_param3(42u32, "hello".to_owned(), true).unwrap();
    msg.dynheader.serial = Some(9);

    let mut buf = Vec::new();
    marshal(&msg, std::num::NonZeroU32::new(9).unwrap(), &mut buf).unwrap();

    let (hdrbytes, header) = unmarshal_header(&buf, 0).unwrap();
    let (dynhdrbytes, dynheader) = unmarshal_dynamic_header(&header, &buf, hdrbytes).unwrap();
    let (_, unmarshalled) =
        unmarshal_next_message(&header, dynheader, &buf, hdrbytes + dynhdrbytes).unwrap();

    assert_eq!(unmarshalled.typ, MessageType::Call);
    assert_eq!(unmarshalled.dynheader.member.as_deref(), Some("Echo"));
    assert_eq!(unmarshalled.dynheader.interface.as_deref(), Some("io.example.Iface"));
    assert_eq!(unmarshalled.get_sig(), "usb");

    let mut parser = unmarshalled.body.parser();
    assert_eq!(parser.get::<u32>().unwrap(), 42);
    assert_eq!(parser.get::<String>().unwrap(), "hello");
    assert!(parser.get::<bool>().unwrap());
}

/// Two messages sent back to back over the same `SendConn` get distinct,
/// increasing serials -- callers rely on this to correlate replies without
/// tracking their own counter.
#[test]
fn serials_are_monotonic_across_sends() {
    let (mut client, _server) = DuplexConn::test_pair().unwrap();

    let mut first = wrappers::method_call(&peer_address(), "Ping").unwrap();
    let mut second = wrappers::method_call(&peer_address(), "Ping").unwrap();

    let first_serial = client.send.send_message(&mut first).unwrap().write_all().unwrap();
    let second_serial = client.send.send_message(&mut second).unwrap().write_all().unwrap();

    assert!(second_serial > first_serial);
}

/// A call placed through a `BlockingRouter` gets its reply even though
/// other, non-matching traffic (a signal) is interleaved before it --
/// the router must keep reading until the reply with the right serial
/// shows up, routing everything else to filters instead of discarding it.
#[test]
fn send_and_get_reply_skips_interleaved_signal() {
    let (client_conn, mut server_conn) = DuplexConn::test_pair().unwrap();

    let server = thread::spawn(move || {
        let call = server_conn
            .recv
            .get_next_message(Timeout::Duration(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(call.dynheader.member.as_deref(), Some("Ping"));

        let mut signal = MessageBuilder::new()
            .signal(
                "io.example.Iface".to_owned(),
                "Heartbeat".to_owned(),
                "/io/example/Obj".to_owned(),
            )
            .build();
        server_conn.send.send_message(&mut signal).unwrap().write_all().unwrap();

        let mut reply = wrappers::method_return(&call);
        server_conn.send.send_message(&mut reply).unwrap().write_all().unwrap();
    });

    let mut router = BlockingRouter::new(client_conn);
    let heartbeat_rule = MatchRule::new()
        .with_type("signal".to_owned())
        .with_member("Heartbeat".to_owned());
    let filter_id = router.add_filter(heartbeat_rule, 4);

    let mut call = wrappers::method_call(&peer_address(), "Ping").unwrap();
    let reply = router
        .send_and_get_reply(&mut call, Timeout::Duration(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(reply.typ, MessageType::Reply);

    let heartbeat = router.try_recv(filter_id).expect("heartbeat was queued for the filter");
    assert_eq!(heartbeat.dynheader.member.as_deref(), Some("Heartbeat"));

    server.join().unwrap();
}

/// A filter registered for a member it never sees stays empty, and an
/// unrelated signal is never handed to it.
#[test]
fn filter_ignores_non_matching_signal() {
    let (client_conn, mut server_conn) = DuplexConn::test_pair().unwrap();

    let server = thread::spawn(move || {
        let mut signal = MessageBuilder::new()
            .signal(
                "io.example.Iface".to_owned(),
                "SomethingElse".to_owned(),
                "/io/example/Obj".to_owned(),
            )
            .build();
        server_conn.send.send_message(&mut signal).unwrap().write_all().unwrap();
    });
    server.join().unwrap();

    let mut router = BlockingRouter::new(client_conn);
    let rule = MatchRule::new().with_member("Heartbeat".to_owned());
    let filter_id = router.add_filter(rule, 4);

    router.pump(Timeout::Duration(Duration::from_secs(5))).unwrap();
    assert!(router.try_recv(filter_id).is_none());
}

/// Dropping a `ThreadedRouter` while a call is still outstanding resolves
/// the waiter's future instead of hanging the caller forever.
#[test]
fn threaded_router_wakes_pending_waiter_on_shutdown() {
    use crate::router::ThreadedRouter;

    let (client_conn, server_conn) = DuplexConn::test_pair().unwrap();
    // Keep the server's recv half alive without answering anything, so the
    // call genuinely never gets a reply before we tear the router down.
    let _server_conn = server_conn;

    let router = ThreadedRouter::new(client_conn).unwrap();
    let mut call = wrappers::method_call(&peer_address(), "Ping").unwrap();
    let rx = router
        .send_and_get_reply(&mut call, Timeout::Infinite)
        .unwrap();

    drop(router);

    let result = ThreadedRouter::recv_reply_blocking(rx);
    assert!(result.is_err());
}
