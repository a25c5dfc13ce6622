//! Pair sockets: one peer at a time, both directions.

mod common;

use common::{pool, recv, send, wait_for};
use spindle::sp::{self, Socket, SocketConfig, SocketType, EVENT_IN};

#[test]
fn test_pair_exchange() {
    let pool = pool();
    let a = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    let b = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    sp::inproc::connect(&a, &b, Default::default(), 4).unwrap();

    send(&a, "ping");
    assert_eq!(recv(&b), "ping");
    send(&b, "pong");
    wait_for("reply", || a.events() & EVENT_IN != 0);
    assert_eq!(recv(&a), "pong");
}

#[test]
fn test_pair_ignores_second_peer() {
    let pool = pool();
    let a = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    let b = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    let intruder = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    sp::inproc::connect(&a, &b, Default::default(), 4).unwrap();
    send(&b, "first");
    assert_eq!(recv(&a), "first");

    sp::inproc::connect(&a, &intruder, Default::default(), 4).unwrap();
    // The intruder's pipe is refused by `a`; its send may already see the
    // far end gone.
    let _ = intruder.send("intruder");
    send(&b, "second");
    assert_eq!(recv(&a), "second");
    send(&a, "reply");
    assert_eq!(recv(&b), "reply");
}

#[test]
fn test_close_terminates_with_connected_peer() {
    let pool = pool();
    let a = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    let b = Socket::open(pool.context(), SocketConfig::new(SocketType::Pair)).unwrap();
    sp::inproc::connect(&a, &b, Default::default(), 4).unwrap();
    send(&a, "bye");
    assert_eq!(recv(&b), "bye");

    let termination = a.close();
    assert!(termination.wait_timeout(std::time::Duration::from_secs(5)));
}
