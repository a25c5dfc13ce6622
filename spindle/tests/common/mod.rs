//! Helpers for tests running sockets on a real worker pool.

#![allow(dead_code)]

use spindle::sp::Socket;
use spindle::worker::{PoolConfig, WorkerPool};
use spindle::Bytes;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

pub fn pool() -> WorkerPool {
    spindle::dev_tracing::init_tracing();
    WorkerPool::new(PoolConfig::default().with_threads(2).with_thread_name("test-worker"))
        .expect("spawn worker pool")
}

/// Polls `cond` until it holds, panicking after a few seconds.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Receives one message, retrying while the socket reports `Again`.
pub fn recv(socket: &Socket) -> Bytes {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match socket.recv() {
            Ok(msg) => return msg,
            Err(e) if e.is_again() => {
                assert!(Instant::now() < deadline, "timed out receiving");
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("recv failed: {e}"),
        }
    }
}

/// Sends one message, retrying while the socket reports `Again`.
pub fn send(socket: &Socket, msg: &'static str) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match socket.send(msg) {
            Ok(()) => return,
            Err(e) if e.is_again() => {
                assert!(Instant::now() < deadline, "timed out sending");
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("send failed: {e}"),
        }
    }
}
