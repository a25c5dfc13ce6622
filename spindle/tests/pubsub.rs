//! Publish/subscribe across sockets connected in-process.

mod common;

use common::{pool, recv, wait_for};
use spindle::sp::{self, Socket, SocketConfig, SocketType};
use spindle::SpindleError;

/// Publishes probes until every subscriber has seen one, so that all of the
/// publisher's pipes are known to be writable. Subscribers are drained on
/// each round to keep their pipes from filling up.
fn await_links(publisher: &Socket, subscribers: &[&Socket]) {
    let mut seen = vec![false; subscribers.len()];
    wait_for("subscriber links", || {
        publisher.send("probe").unwrap();
        for (i, sub) in subscribers.iter().enumerate() {
            while sub.recv().is_ok() {
                seen[i] = true;
            }
        }
        seen.iter().all(|&s| s)
    });
}

/// Receives the next message that is not a probe.
fn next(subscriber: &Socket) -> String {
    loop {
        let msg = recv(subscriber);
        if msg != "probe" {
            return String::from_utf8(msg.to_vec()).unwrap();
        }
    }
}

#[test]
fn test_subscribers_receive_matching_topics_only() {
    let pool = pool();
    let publisher = Socket::open(pool.context(), SocketConfig::new(SocketType::Pub)).unwrap();
    let weather = Socket::open(pool.context(), SocketConfig::new(SocketType::Sub)).unwrap();
    let sports = Socket::open(pool.context(), SocketConfig::new(SocketType::Sub)).unwrap();

    for (sub, topic) in [(&weather, &b"weather."[..]), (&sports, b"sports.")] {
        sub.subscribe(b"probe").unwrap();
        sub.subscribe(topic).unwrap();
        sp::inproc::connect(&publisher, sub, Default::default(), 1024).unwrap();
    }
    await_links(&publisher, &[&weather, &sports]);

    for msg in ["weather.rain", "sports.goal", "news.flash", "weather.sun", "sports.end"] {
        publisher.send(msg).unwrap();
    }
    publisher.send("end").unwrap();

    assert_eq!(next(&weather), "weather.rain");
    assert_eq!(next(&weather), "weather.sun");
    assert_eq!(next(&sports), "sports.goal");
    assert_eq!(next(&sports), "sports.end");
}

#[test]
fn test_unsubscribed_topic_stops_arriving() {
    let pool = pool();
    let publisher = Socket::open(pool.context(), SocketConfig::new(SocketType::Pub)).unwrap();
    let sub = Socket::open(pool.context(), SocketConfig::new(SocketType::Sub)).unwrap();
    sub.subscribe(b"probe").unwrap();
    sub.subscribe(b"a.").unwrap();
    sub.subscribe(b"b.").unwrap();
    sp::inproc::connect(&publisher, &sub, Default::default(), 1024).unwrap();
    await_links(&publisher, &[&sub]);

    sub.unsubscribe(b"a.").unwrap();
    assert!(matches!(
        sub.unsubscribe(b"a."),
        Err(SpindleError::SubscriptionNotFound)
    ));
    publisher.send("a.1").unwrap();
    publisher.send("b.1").unwrap();
    assert_eq!(next(&sub), "b.1");
}

#[test]
fn test_publisher_cannot_receive() {
    let publisher = Socket::new(SocketType::Pub).unwrap();
    assert!(matches!(publisher.recv(), Err(SpindleError::NotSupported)));
    publisher.close().wait();
}
