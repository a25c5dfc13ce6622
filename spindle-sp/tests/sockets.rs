//! Socket patterns behind the socket root, fed through scripted streams.

mod common;

use bytes::Bytes;
use common::*;
use spindle_core::context::Context;
use spindle_core::error::SpindleError;
use spindle_core::options::PipeOptions;
use spindle_core::pipe::Pipe;
use spindle_sp::socket::{Socket, SocketConfig};
use spindle_sp::{SocketType, EVENT_IN};

fn publish(ctl: &StreamCtl, msgs: &[&'static str]) {
    for msg in msgs {
        ctl.peer.send(Bytes::from_static(msg.as_bytes())).unwrap();
    }
    ctl.readable();
}

#[test]
fn test_sub_socket_delivers_only_subscribed_topics() {
    let log = CallLog::default();
    let sub = socket(SocketType::Sub);
    sub.subscribe(b"news.").unwrap();
    let (stream, ctl) = mock_stream("pub", &log);
    sub.attach(Box::new(stream)).unwrap();
    ctl.established();

    publish(&ctl, &["sport.1", "news.1", "weather.1", "news.2"]);
    assert_eq!(sub.events(), EVENT_IN);
    assert_eq!(sub.recv().unwrap(), "news.1");
    assert_eq!(sub.recv().unwrap(), "news.2");
    assert!(sub.recv().unwrap_err().is_again());
    assert_eq!(sub.events(), 0);
}

#[test]
fn test_sub_socket_unsubscribe() {
    let sub = socket(SocketType::Sub);
    sub.subscribe(b"a").unwrap();
    sub.unsubscribe(b"a").unwrap();
    assert!(matches!(
        sub.unsubscribe(b"a"),
        Err(SpindleError::SubscriptionNotFound)
    ));
    assert!(matches!(sub.send("x"), Err(SpindleError::NotSupported)));
}

#[test]
fn test_subscribe_on_push_is_not_supported() {
    let push = socket(SocketType::Push);
    assert!(matches!(
        push.subscribe(b"a"),
        Err(SpindleError::NotSupported)
    ));
}

#[test]
fn test_pull_socket_fair_queues_between_peers() {
    let log = CallLog::default();
    let pull = socket(SocketType::Pull);
    let (a_stream, a) = mock_stream("a", &log);
    let (b_stream, b) = mock_stream("b", &log);
    pull.attach(Box::new(a_stream)).unwrap();
    pull.attach(Box::new(b_stream)).unwrap();
    a.established();
    b.established();

    publish(&a, &["a1", "a2"]);
    publish(&b, &["b1", "b2"]);
    let got: Vec<Bytes> = (0..4).map(|_| pull.recv().unwrap()).collect();
    assert_eq!(got, vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_push_socket_honours_send_priority() {
    let log = CallLog::default();
    let push = socket(SocketType::Push);
    let (fast_stream, fast) =
        mock_stream_with("fast", &log, PipeOptions::default().with_send_priority(1));
    let (slow_stream, slow) = mock_stream("slow", &log);
    push.attach(Box::new(slow_stream)).unwrap();
    push.attach(Box::new(fast_stream)).unwrap();
    for ctl in [&fast, &slow] {
        ctl.established();
        ctl.writable();
    }

    for _ in 0..5 {
        push.send("job").unwrap();
    }
    assert_eq!(fast.peer.pending(), 5);
    assert_eq!(slow.peer.pending(), 0);

    // Once the preferred peer goes away the remaining one takes over.
    fast.error();
    push.send("job").unwrap();
    assert_eq!(slow.peer.pending(), 1);
}

#[test]
fn test_req_socket_round_trip() {
    let log = CallLog::default();
    let req = socket(SocketType::Req);
    let (stream, rep) = mock_stream("rep", &log);
    req.attach(Box::new(stream)).unwrap();
    rep.established();
    rep.writable();

    req.send("question").unwrap();
    assert_eq!(rep.peer.recv().unwrap().0, "question");
    publish(&rep, &["answer"]);
    assert_eq!(req.recv().unwrap(), "answer");
}

#[test]
fn test_rep_sockets_are_not_supported() {
    assert!(matches!(
        Socket::open(Context::new(), SocketConfig::new(SocketType::Rep)),
        Err(SpindleError::NotSupported)
    ));
}
