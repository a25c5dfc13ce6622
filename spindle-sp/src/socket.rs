//! Socket root state machine and the application-facing handle.
//!
//! The root owns the pattern and every endpoint (bound listeners and attached
//! streams). Sessions anywhere below it report their pipes with `PIPE_*`
//! events, which the root resolves against the pattern. Closing stops every
//! endpoint; once the last one reports back the root goes idle and the
//! [`Termination`] handed out by [`Socket::close`] completes.

use crate::pattern::{self, SocketOption, SocketPattern};
use crate::socket_type::SocketType;
use crate::transport::{
    Listener, RawListener, RawStream, Session, ERROR, PIPE_ATTACHED, PIPE_DETACHED, PIPE_IN,
    PIPE_OUT, REJECTED, SRC_PIPE, SRC_SOCKET, STOPPED,
};
use bytes::Bytes;
use hashbrown::HashMap;
use smallvec::SmallVec;
use spindle_core::context::{Context, FsmCx};
use spindle_core::error::{Result, SpindleError};
use spindle_core::event::{EventId, FsmEvent, FsmId, Src, ACTION, START, STOP};
use spindle_core::fsm::{bad_action, bad_source, FsmState, StateMachine};
use spindle_core::pipe::PipeId;
use spindle_core::stats::StatsSink;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const SRC_LISTENER: Src = 1;
const SRC_ATTACHED: Src = 2;

/// Identity of an endpoint of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(FsmId);

impl EndpointId {
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.to_bits()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Listener,
    Attached,
}

/// Socket configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub socket_type: SocketType,
    /// Where listeners report connection statistics (default: disabled)
    pub stats: StatsSink,
}

impl SocketConfig {
    #[must_use]
    pub fn new(socket_type: SocketType) -> Self {
        Self {
            socket_type,
            stats: StatsSink::disabled(),
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: StatsSink) -> Self {
        self.stats = stats;
        self
    }
}

pub(crate) struct SocketFsm {
    pattern: Box<dyn SocketPattern>,
    endpoints: HashMap<FsmId, Endpoint>,
    /// Session to pipe, for every pipe the pattern holds.
    pipes: HashMap<FsmId, PipeId>,
    /// Rejection events, reused once delivered.
    rejects: SmallVec<[EventId; 2]>,
    stats: StatsSink,
    /// Dropped when the socket has fully stopped.
    done: Option<flume::Sender<()>>,
}

impl SocketFsm {
    fn bind(&mut self, cx: &mut FsmCx<'_>, listener: Box<dyn RawListener>) -> EndpointId {
        let socket = cx.id();
        let id = cx.spawn(
            Listener::new(listener, socket, self.stats.clone()),
            SRC_LISTENER,
        );
        cx.start(id);
        self.endpoints.insert(id, Endpoint::Listener);
        debug!(socket = %socket, endpoint = %id, "[SOCKET] bound");
        EndpointId(id)
    }

    fn attach(&mut self, cx: &mut FsmCx<'_>, stream: Box<dyn RawStream>) -> EndpointId {
        let socket = cx.id();
        let id = cx.spawn(Session::new(stream, socket), SRC_ATTACHED);
        cx.start(id);
        self.endpoints.insert(id, Endpoint::Attached);
        debug!(socket = %socket, endpoint = %id, "[SOCKET] stream attached");
        EndpointId(id)
    }

    fn unbind(&mut self, cx: &mut FsmCx<'_>, endpoint: EndpointId) -> Result<()> {
        if !self.endpoints.contains_key(&endpoint.0) {
            return Err(SpindleError::UnknownEndpoint(endpoint.as_u64()));
        }
        debug!(socket = %cx.id(), %endpoint, "[SOCKET] removing endpoint");
        cx.stop(endpoint.0);
        Ok(())
    }

    fn on_attached(&mut self, cx: &mut FsmCx<'_>, session: FsmId) {
        if !cx.contains(session) {
            return;
        }
        let Some(pipe) = cx.with::<Session, _>(session, |s, _| s.pipe()) else {
            return;
        };
        let id = pipe.id();
        match self.pattern.add(pipe) {
            Ok(()) => {
                debug!(socket = %cx.id(), pipe = id, "[SOCKET] pipe attached");
                self.pipes.insert(session, id);
            }
            Err(e) => {
                debug!(socket = %cx.id(), pipe = id, error = %e, "[SOCKET] pipe rejected");
                let reject = self.reject_event(cx);
                cx.raise_at(reject, session, SRC_SOCKET, REJECTED);
            }
        }
    }

    fn reject_event(&mut self, cx: &mut FsmCx<'_>) -> EventId {
        if let Some(&free) = self.rejects.iter().find(|&&ev| !cx.is_queued(ev)) {
            return free;
        }
        let ev = cx.new_event();
        self.rejects.push(ev);
        ev
    }

    fn on_detached(&mut self, cx: &mut FsmCx<'_>, session: FsmId) {
        if let Some(pipe) = self.pipes.remove(&session) {
            self.pattern.remove(pipe);
            debug!(socket = %cx.id(), pipe, "[SOCKET] pipe detached");
        }
    }

    fn on_pipe_event(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        let Some(session) = ev.source else {
            bad_source("socket", cx.fsm_state(), ev);
        };
        match ev.kind {
            PIPE_ATTACHED => self.on_attached(cx, session),
            PIPE_DETACHED => self.on_detached(cx, session),
            PIPE_IN | PIPE_OUT => {
                let Some(&pipe) = self.pipes.get(&session) else {
                    trace!(%session, kind = ev.kind, "[SOCKET] readiness for unknown pipe");
                    return;
                };
                if ev.kind == PIPE_IN {
                    self.pattern.pipe_in(pipe);
                } else {
                    self.pattern.pipe_out(pipe);
                }
            }
            _ => bad_action("socket", cx.fsm_state(), ev),
        }
    }

    fn on_endpoint_stopped(&mut self, cx: &mut FsmCx<'_>, endpoint: FsmId) {
        self.endpoints.remove(&endpoint);
        drop(cx.remove(endpoint));
        debug!(socket = %cx.id(), %endpoint, remaining = self.endpoints.len(), "[SOCKET] endpoint removed");
    }

    fn finish_if_drained(&mut self, cx: &mut FsmCx<'_>) {
        if self.endpoints.is_empty() {
            debug!(socket = %cx.id(), "[SOCKET] closed");
            cx.stopped_noevent();
            self.done = None;
        }
    }
}

impl StateMachine for SocketFsm {
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        trace!(socket = %cx.id(), src = ev.src, kind = ev.kind, "[SOCKET] event");
        match (ev.src, ev.kind, ev.source) {
            (ACTION, START, _) => {
                debug!(socket = %cx.id(), socket_type = %self.pattern.socket_type(), "[SOCKET] open");
            }
            (SRC_PIPE, _, _) => self.on_pipe_event(cx, ev),
            (SRC_LISTENER | SRC_ATTACHED, STOPPED, Some(endpoint)) => {
                self.on_endpoint_stopped(cx, endpoint);
            }
            (SRC_ATTACHED, ERROR, Some(endpoint)) => cx.stop(endpoint),
            (SRC_LISTENER | SRC_ATTACHED, _, _) => bad_action("socket", cx.fsm_state(), ev),
            _ => bad_source("socket", cx.fsm_state(), ev),
        }
    }

    fn shutdown(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        match (ev.src, ev.kind, ev.source) {
            (ACTION, STOP, _) => {
                debug!(socket = %cx.id(), endpoints = self.endpoints.len(), "[SOCKET] closing");
                for &endpoint in self.endpoints.keys() {
                    cx.stop(endpoint);
                }
                self.finish_if_drained(cx);
            }
            (SRC_PIPE, PIPE_DETACHED, Some(session)) => self.on_detached(cx, session),
            (SRC_LISTENER | SRC_ATTACHED, STOPPED, Some(endpoint)) => {
                self.on_endpoint_stopped(cx, endpoint);
                self.finish_if_drained(cx);
            }
            _ => {
                trace!(socket = %cx.id(), src = ev.src, kind = ev.kind, "[SOCKET] ignoring event while closing");
            }
        }
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}

/// Completes when a closed socket has stopped every endpoint.
#[derive(Debug, Clone)]
pub struct Termination {
    rx: flume::Receiver<()>,
}

impl Termination {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.rx.is_disconnected()
    }

    /// Blocks until the socket has stopped.
    pub fn wait(&self) {
        while self.rx.recv().is_ok() {}
    }

    /// Returns true if the socket stopped within `timeout`.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(flume::RecvTimeoutError::Disconnected)
        )
    }
}

/// Application handle of a socket.
///
/// Every call enters the socket's context, so it must not be made from a
/// state machine handler running in that context.
pub struct Socket {
    ctx: Arc<Context>,
    id: FsmId,
    socket_type: SocketType,
    termination: Termination,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("socket_type", &self.socket_type)
            .field("context", &self.ctx.id())
            .finish()
    }
}

impl Socket {
    /// Opens a socket in a context of its own, driven by calling threads.
    pub fn new(socket_type: SocketType) -> Result<Self> {
        Self::open(Context::new(), SocketConfig::new(socket_type))
    }

    /// Opens a socket as a root machine of `ctx`.
    pub fn open(ctx: Arc<Context>, config: SocketConfig) -> Result<Self> {
        let pattern = pattern::create(config.socket_type)?;
        let (tx, rx) = flume::bounded(1);
        let id = {
            let mut cx = ctx.enter();
            let id = cx.insert_root(SocketFsm {
                pattern,
                endpoints: HashMap::new(),
                pipes: HashMap::new(),
                rejects: SmallVec::new(),
                stats: config.stats,
                done: Some(tx),
            });
            cx.start(id);
            id
        };
        Ok(Self {
            ctx,
            id,
            socket_type: config.socket_type,
            termination: Termination { rx },
        })
    }

    #[inline]
    #[must_use]
    pub const fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    fn with<R>(&self, f: impl FnOnce(&mut SocketFsm, &mut FsmCx<'_>) -> Result<R>) -> Result<R> {
        let mut cx = self.ctx.enter();
        if cx.fsm_state(self.id) != Some(FsmState::Active) {
            return Err(SpindleError::Terminated);
        }
        cx.with::<SocketFsm, _>(self.id, f)
    }

    /// Starts accepting connections from `listener`.
    pub fn bind(&self, listener: Box<dyn RawListener>) -> Result<EndpointId> {
        self.with(|socket, cx| Ok(socket.bind(cx, listener)))
    }

    /// Adds an already connected stream.
    pub fn attach(&self, stream: Box<dyn RawStream>) -> Result<EndpointId> {
        self.with(|socket, cx| Ok(socket.attach(cx, stream)))
    }

    /// Stops an endpoint and every connection it accepted.
    pub fn unbind(&self, endpoint: EndpointId) -> Result<()> {
        self.with(|socket, cx| socket.unbind(cx, endpoint))
    }

    /// Fails with `Again` when no peer can take the message right now.
    pub fn send(&self, msg: impl Into<Bytes>) -> Result<()> {
        let msg = msg.into();
        self.with(|socket, _| socket.pattern.send(msg))
    }

    /// Fails with `Again` when no message is available right now.
    pub fn recv(&self) -> Result<Bytes> {
        self.with(|socket, _| socket.pattern.recv())
    }

    /// Current readiness as a mask of [`EVENT_IN`](crate::pattern::EVENT_IN)
    /// and [`EVENT_OUT`](crate::pattern::EVENT_OUT). Zero once closed.
    #[must_use]
    pub fn events(&self) -> u32 {
        self.with(|socket, _| Ok(socket.pattern.events()))
            .unwrap_or(0)
    }

    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        self.with(|socket, _| socket.pattern.set_option(option))
    }

    pub fn subscribe(&self, topic: &[u8]) -> Result<()> {
        self.set_option(SocketOption::Subscribe(Bytes::copy_from_slice(topic)))
    }

    /// Fails with `SubscriptionNotFound` if `topic` was not subscribed.
    pub fn unsubscribe(&self, topic: &[u8]) -> Result<()> {
        self.set_option(SocketOption::Unsubscribe(Bytes::copy_from_slice(topic)))
    }

    /// Begins a graceful close. Endpoints finish their teardown
    /// asynchronously; the returned [`Termination`] reports when they are done.
    pub fn close(self) -> Termination {
        self.termination.clone()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let mut cx = self.ctx.enter();
        if cx.fsm_state(self.id) == Some(FsmState::Active) {
            cx.stop(self.id);
        }
        // A socket still tearing down endpoints stays registered until the
        // context goes away.
        if cx.contains(self.id) && cx.is_idle(self.id) {
            drop(cx.remove(self.id));
        }
    }
}
