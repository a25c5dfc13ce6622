//! Scripted transport for driving the connection machines from a test.
//!
//! Completions are posted from the test thread after every mock lock has been
//! released, the same way a real transport posts from its I/O threads.

#![allow(dead_code)]

use parking_lot::Mutex;
use spindle_core::context::{Context, FsmHandle};
use spindle_core::event::EventType;
use spindle_core::inproc::{self, InprocPipe};
use spindle_core::options::PipeOptions;
use spindle_core::pipe::PipeRef;
use spindle_core::stats::{StatUpdate, Statistic, StatsMonitor};
use spindle_sp::socket::{Socket, SocketConfig};
use spindle_sp::transport::{
    RawListener, RawStream, ACCEPTED, ACCEPT_ERROR, CLOSED, ERROR, ESTABLISHED, READABLE,
    WRITABLE,
};
use spindle_sp::SocketType;
use std::sync::Arc;

/// Ordered record of every call the machines made into the transport.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

#[derive(Default)]
struct ListenerShared {
    pending: Option<FsmHandle>,
    accepted: Option<Box<dyn RawStream>>,
    closing: Option<FsmHandle>,
    accepts: usize,
}

pub struct MockListener {
    shared: Arc<Mutex<ListenerShared>>,
    log: CallLog,
}

pub struct ListenerCtl {
    shared: Arc<Mutex<ListenerShared>>,
}

pub fn mock_listener(log: &CallLog) -> (MockListener, ListenerCtl) {
    let shared = Arc::new(Mutex::new(ListenerShared::default()));
    (
        MockListener {
            shared: Arc::clone(&shared),
            log: Arc::clone(log),
        },
        ListenerCtl { shared },
    )
}

impl RawListener for MockListener {
    fn accept(&mut self, notify: FsmHandle) {
        let mut shared = self.shared.lock();
        shared.accepts += 1;
        shared.pending = Some(notify);
        self.log.lock().push("listener.accept".into());
    }

    fn take_accepted(&mut self) -> Option<Box<dyn RawStream>> {
        self.shared.lock().accepted.take()
    }

    fn cancel_accept(&mut self) {
        self.shared.lock().pending = None;
        self.log.lock().push("listener.cancel".into());
    }

    fn close(&mut self, notify: FsmHandle) {
        self.shared.lock().closing = Some(notify);
        self.log.lock().push("listener.close".into());
    }
}

impl ListenerCtl {
    pub fn accepts(&self) -> usize {
        self.shared.lock().accepts
    }

    pub fn is_closing(&self) -> bool {
        self.shared.lock().closing.is_some()
    }

    fn complete(&self, kind: EventType) {
        let notify = self.shared.lock().pending.take().expect("no accept pending");
        notify.post(kind);
    }

    /// Completes the pending accept with `stream`.
    pub fn accept(&self, stream: MockStream) {
        self.shared.lock().accepted = Some(Box::new(stream));
        self.complete(ACCEPTED);
    }

    pub fn fail(&self) {
        self.complete(ACCEPT_ERROR);
    }

    pub fn finish_close(&self) {
        let notify = self.shared.lock().closing.take().expect("listener not closing");
        notify.post(CLOSED);
    }
}

#[derive(Default)]
struct StreamShared {
    notify: Option<FsmHandle>,
    closing: Option<FsmHandle>,
}

pub struct MockStream {
    name: &'static str,
    pipe: PipeRef,
    shared: Arc<Mutex<StreamShared>>,
    log: CallLog,
}

pub struct StreamCtl {
    shared: Arc<Mutex<StreamShared>>,
    /// Remote end of the stream's pipe.
    pub peer: InprocPipe,
}

pub fn mock_stream(name: &'static str, log: &CallLog) -> (MockStream, StreamCtl) {
    mock_stream_with(name, log, PipeOptions::default())
}

pub fn mock_stream_with(
    name: &'static str,
    log: &CallLog,
    options: PipeOptions,
) -> (MockStream, StreamCtl) {
    let (ours, peer) = inproc::pair(options, PipeOptions::default(), 16);
    let shared = Arc::new(Mutex::new(StreamShared::default()));
    (
        MockStream {
            name,
            pipe: Arc::new(ours),
            shared: Arc::clone(&shared),
            log: Arc::clone(log),
        },
        StreamCtl { shared, peer },
    )
}

impl RawStream for MockStream {
    fn start(&mut self, notify: FsmHandle) {
        self.shared.lock().notify = Some(notify);
        self.log.lock().push(format!("{}.start", self.name));
    }

    fn pipe(&self) -> PipeRef {
        Arc::clone(&self.pipe)
    }

    fn cancel(&mut self) {
        self.log.lock().push(format!("{}.cancel", self.name));
    }

    fn close(&mut self, notify: FsmHandle) {
        self.shared.lock().closing = Some(notify);
        self.log.lock().push(format!("{}.close", self.name));
    }
}

impl StreamCtl {
    fn post(&self, kind: EventType) {
        let notify = self.shared.lock().notify.clone().expect("stream not started");
        notify.post(kind);
    }

    pub fn established(&self) {
        self.post(ESTABLISHED);
    }

    pub fn readable(&self) {
        self.post(READABLE);
    }

    pub fn writable(&self) {
        self.post(WRITABLE);
    }

    pub fn error(&self) {
        self.post(ERROR);
    }

    pub fn is_closing(&self) -> bool {
        self.shared.lock().closing.is_some()
    }

    pub fn finish_close(&self) {
        let notify = self.shared.lock().closing.take().expect("stream not closing");
        notify.post(CLOSED);
    }
}

/// Opens a socket in its own caller-driven context.
pub fn socket(socket_type: SocketType) -> Socket {
    Socket::open(Context::new(), SocketConfig::new(socket_type)).unwrap()
}

pub fn socket_with_stats(socket_type: SocketType) -> (Socket, StatsMonitor) {
    let (sink, monitor) = spindle_core::stats::create_monitor();
    let socket = Socket::open(
        Context::new(),
        SocketConfig::new(socket_type).with_stats(sink),
    )
    .unwrap();
    (socket, monitor)
}

pub fn drain_stats(monitor: &StatsMonitor) -> Vec<Statistic> {
    monitor
        .try_iter()
        .map(|StatUpdate { stat, .. }| stat)
        .collect()
}
