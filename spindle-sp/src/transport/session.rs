//! Protocol session over one connected stream.
//!
//! ```text
//! IDLE --start--> HANDSHAKING --established--> ACTIVE --error/rejected--> DONE
//! ```
//!
//! Once established the session attaches the stream's pipe to the socket root
//! and relays the stream's readiness as pipe in/out events. Stopping detaches
//! the pipe; the stream itself stays with the session until its owner takes it
//! back to close it.

use super::{
    RawStream, ERROR, ESTABLISHED, PIPE_ATTACHED, PIPE_DETACHED, PIPE_IN, PIPE_OUT, READABLE,
    REJECTED, SRC_PIPE, STOPPED, WRITABLE,
};
use spindle_core::context::FsmCx;
use spindle_core::event::{EventId, EventType, FsmEvent, FsmId, Src, ACTION, START, STOP};
use spindle_core::fsm::{bad_action, bad_source, StateMachine};
use spindle_core::pipe::PipeRef;
use tracing::{debug, trace};

const SRC_STREAM: Src = 1;
/// Source stamp of events the socket root raises at a session.
pub(crate) const SRC_SOCKET: Src = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Handshaking,
    Active,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct SessionEvents {
    attached: EventId,
    pipe_in: EventId,
    pipe_out: EventId,
    detached: EventId,
    error: EventId,
}

pub(crate) struct Session {
    state: SessionState,
    stream: Option<Box<dyn RawStream>>,
    pipe: Option<PipeRef>,
    socket: FsmId,
    /// The socket root knows the pipe.
    attached: bool,
    established: bool,
    events: Option<SessionEvents>,
}

impl Session {
    pub(crate) fn new(stream: Box<dyn RawStream>, socket: FsmId) -> Self {
        Self {
            state: SessionState::Idle,
            stream: Some(stream),
            pipe: None,
            socket,
            attached: false,
            established: false,
            events: None,
        }
    }

    /// Pipe of an established session.
    pub(crate) fn pipe(&self) -> Option<PipeRef> {
        self.pipe.clone()
    }

    pub(crate) fn take_stream(&mut self) -> Option<Box<dyn RawStream>> {
        self.stream.take()
    }

    /// True once the handshake has completed, even if the session failed
    /// afterwards.
    pub(crate) const fn was_established(&self) -> bool {
        self.established
    }

    fn events(&self) -> SessionEvents {
        self.events.expect("session events are allocated on start")
    }

    /// Raises a pipe event at the socket root, coalescing with one that is
    /// still queued.
    fn notify_socket(&self, cx: &mut FsmCx<'_>, event: EventId, kind: EventType) {
        if !cx.is_queued(event) {
            cx.raise_at(event, self.socket, SRC_PIPE, kind);
        }
    }

    fn detach(&mut self, cx: &mut FsmCx<'_>) {
        if self.attached {
            self.attached = false;
            let detached = self.events().detached;
            self.notify_socket(cx, detached, PIPE_DETACHED);
        }
    }

    fn fail(&mut self, cx: &mut FsmCx<'_>) {
        self.detach(cx);
        if let Some(stream) = self.stream.as_mut() {
            stream.cancel();
        }
        self.state = SessionState::Done;
        let error = self.events().error;
        cx.raise(error, ERROR);
    }
}

impl StateMachine for Session {
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        trace!(id = %cx.id(), state = ?self.state, src = ev.src, kind = ev.kind, "[SESSION] event");
        match self.state {
            SessionState::Idle => {
                if !ev.is(ACTION, START) {
                    trace!("[SESSION] ignoring late event while idle");
                    return;
                }
                self.events = Some(SessionEvents {
                    attached: cx.new_event(),
                    pipe_in: cx.new_event(),
                    pipe_out: cx.new_event(),
                    detached: cx.new_event(),
                    error: cx.new_event(),
                });
                let notify = cx.handle(SRC_STREAM);
                if let Some(stream) = self.stream.as_mut() {
                    stream.start(notify);
                }
                self.state = SessionState::Handshaking;
            }

            SessionState::Handshaking => match (ev.src, ev.kind) {
                (SRC_STREAM, ESTABLISHED) => {
                    self.pipe = self.stream.as_ref().map(|s| s.pipe());
                    self.established = true;
                    self.attached = true;
                    let attached = self.events().attached;
                    cx.raise_at(attached, self.socket, SRC_PIPE, PIPE_ATTACHED);
                    debug!(id = %cx.id(), "[SESSION] established");
                    self.state = SessionState::Active;
                }
                (SRC_STREAM, ERROR) => {
                    debug!(id = %cx.id(), "[SESSION] handshake failed");
                    self.fail(cx);
                }
                (SRC_STREAM, _) => bad_action("session", self.state, ev),
                _ => bad_source("session", self.state, ev),
            },

            SessionState::Active => match (ev.src, ev.kind) {
                (SRC_STREAM, READABLE) => {
                    let pipe_in = self.events().pipe_in;
                    self.notify_socket(cx, pipe_in, PIPE_IN);
                }
                (SRC_STREAM, WRITABLE) => {
                    let pipe_out = self.events().pipe_out;
                    self.notify_socket(cx, pipe_out, PIPE_OUT);
                }
                (SRC_STREAM, ERROR) => {
                    debug!(id = %cx.id(), "[SESSION] connection broken");
                    self.fail(cx);
                }
                (SRC_SOCKET, REJECTED) => {
                    debug!(id = %cx.id(), "[SESSION] pipe rejected by socket");
                    // The socket never added the pipe, so there is nothing to detach.
                    self.attached = false;
                    self.fail(cx);
                }
                (SRC_STREAM | SRC_SOCKET, _) => bad_action("session", self.state, ev),
                _ => bad_source("session", self.state, ev),
            },

            SessionState::Done => {
                trace!(id = %cx.id(), "[SESSION] ignoring event after failure");
            }
        }
    }

    fn shutdown(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        if !ev.is(ACTION, STOP) {
            trace!(id = %cx.id(), src = ev.src, kind = ev.kind, "[SESSION] ignoring event while stopping");
            return;
        }
        if self.events.is_some() {
            self.detach(cx);
        }
        // A failed session already cancelled its stream.
        if self.state != SessionState::Done {
            if let Some(stream) = self.stream.as_mut() {
                stream.cancel();
            }
        }
        debug!(id = %cx.id(), "[SESSION] stopped");
        self.state = SessionState::Idle;
        cx.stopped(STOPPED);
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
