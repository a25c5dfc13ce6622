//! One connection from accept to close.
//!
//! The listener lends its raw listening socket to the pending acceptor. When
//! the accept completes the acceptor reports [`ACCEPTED`], the listener takes
//! the socket back and the acceptor lives on as the connection. Teardown is
//! two-phase: the session is stopped first, then the raw stream is closed, and
//! only then is the owner told.
//!
//! ```text
//! IDLE -> ACCEPTING -> ACTIVE -> STOPPING_SESSION -> STOPPING_STREAM -> DONE
//!            ^   |
//!            +---+ accept error: retry
//! ```

use super::session::Session;
use super::{RawListener, RawStream, ACCEPTED, ACCEPT_ERROR, CLOSED, ERROR, STOPPED};
use spindle_core::context::FsmCx;
use spindle_core::event::{EventId, FsmEvent, FsmId, Src, ACTION, START, STOP};
use spindle_core::fsm::{bad_action, bad_source, bad_state, StateMachine};
use spindle_core::stats::{Statistic, StatsSink};
use tracing::{debug, trace, warn};

const SRC_LISTENER: Src = 1;
const SRC_STREAM: Src = 2;
const SRC_SESSION: Src = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptorState {
    Idle,
    Accepting,
    Active,
    StoppingSession,
    StoppingStream,
    Done,
    /// Owner asked to stop while the session was running or stopping.
    StoppingSessionFinal,
    /// Owner asked to stop while the stream was closing.
    StoppingStreamFinal,
}

pub(crate) struct Acceptor {
    state: AcceptorState,
    listener: Option<Box<dyn RawListener>>,
    /// Held between taking it back from the session and its close completing.
    stream: Option<Box<dyn RawStream>>,
    session: Option<FsmId>,
    socket: FsmId,
    stats: StatsSink,
    accepted: Option<EventId>,
    error: Option<EventId>,
}

impl Acceptor {
    pub(crate) fn new(listener: Box<dyn RawListener>, socket: FsmId, stats: StatsSink) -> Self {
        Self {
            state: AcceptorState::Idle,
            listener: Some(listener),
            stream: None,
            session: None,
            socket,
            stats,
            accepted: None,
            error: None,
        }
    }

    /// Returns the borrowed listening socket.
    pub(crate) fn take_listener(&mut self) -> Option<Box<dyn RawListener>> {
        self.listener.take()
    }

    fn accept(&mut self, cx: &mut FsmCx<'_>) {
        let notify = cx.handle(SRC_LISTENER);
        let listener = self
            .listener
            .as_mut()
            .expect("acceptor accepts with a borrowed listener");
        listener.accept(notify);
        self.state = AcceptorState::Accepting;
    }

    fn on_accepted(&mut self, cx: &mut FsmCx<'_>) {
        let stream = self.listener.as_mut().and_then(|l| l.take_accepted());
        let Some(stream) = stream else {
            warn!(id = %cx.id(), "[ACCEPTOR] accept completed without a stream, retrying");
            self.stats.incr(Statistic::AcceptErrors);
            self.accept(cx);
            return;
        };

        self.stats.incr(Statistic::AcceptedConnections);
        debug!(id = %cx.id(), "[ACCEPTOR] connection accepted");
        let accepted = *self.accepted.get_or_insert_with(|| cx.new_event());
        cx.raise(accepted, ACCEPTED);

        let session = cx.spawn(Session::new(stream, self.socket), SRC_SESSION);
        cx.start(session);
        self.session = Some(session);
        self.state = AcceptorState::Active;
    }

    /// Takes the stream back from the stopped session and starts closing it.
    /// Returns false if there was no stream to close.
    fn close_stream(&mut self, cx: &mut FsmCx<'_>) -> bool {
        let stream = self.session.take().and_then(|session| {
            let stream = cx.with::<Session, _>(session, |s, _| s.take_stream());
            drop(cx.remove(session));
            stream
        });
        match stream {
            Some(mut stream) => {
                stream.close(cx.handle(SRC_STREAM));
                self.stream = Some(stream);
                true
            }
            None => false,
        }
    }

    fn report_error(&mut self, cx: &mut FsmCx<'_>) {
        debug!(id = %cx.id(), "[ACCEPTOR] connection closed");
        self.state = AcceptorState::Done;
        let error = *self.error.get_or_insert_with(|| cx.new_event());
        cx.raise(error, ERROR);
    }

    fn finish(&mut self, cx: &mut FsmCx<'_>) {
        self.state = AcceptorState::Idle;
        cx.stopped(STOPPED);
    }
}

impl StateMachine for Acceptor {
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        trace!(id = %cx.id(), state = ?self.state, src = ev.src, kind = ev.kind, "[ACCEPTOR] event");
        match self.state {
            AcceptorState::Idle => {
                if ev.is(ACTION, START) {
                    self.accept(cx);
                } else {
                    trace!(id = %cx.id(), "[ACCEPTOR] ignoring late event while idle");
                }
            }

            AcceptorState::Accepting => match (ev.src, ev.kind) {
                (SRC_LISTENER, ACCEPTED) => self.on_accepted(cx),
                (SRC_LISTENER, ACCEPT_ERROR) => {
                    warn!(id = %cx.id(), "[ACCEPTOR] accept failed, retrying");
                    self.stats.incr(Statistic::AcceptErrors);
                    self.accept(cx);
                }
                (SRC_LISTENER, _) => bad_action("acceptor", self.state, ev),
                _ => bad_source("acceptor", self.state, ev),
            },

            AcceptorState::Active => match (ev.src, ev.kind) {
                (SRC_SESSION, ERROR) => {
                    let session = self.session.expect("active acceptor has a session");
                    let established = cx.with::<Session, _>(session, |s, _| s.was_established());
                    self.stats.incr(if established {
                        Statistic::BrokenConnections
                    } else {
                        Statistic::DroppedConnections
                    });
                    cx.stop(session);
                    self.state = AcceptorState::StoppingSession;
                }
                (SRC_SESSION, _) => bad_action("acceptor", self.state, ev),
                _ => bad_source("acceptor", self.state, ev),
            },

            AcceptorState::StoppingSession => match (ev.src, ev.kind) {
                (SRC_SESSION, STOPPED) => {
                    if self.close_stream(cx) {
                        self.state = AcceptorState::StoppingStream;
                    } else {
                        self.report_error(cx);
                    }
                }
                (SRC_SESSION, _) => bad_action("acceptor", self.state, ev),
                _ => bad_source("acceptor", self.state, ev),
            },

            AcceptorState::StoppingStream => match (ev.src, ev.kind) {
                (SRC_STREAM, CLOSED) => {
                    self.stream = None;
                    self.report_error(cx);
                }
                (SRC_STREAM, _) => bad_action("acceptor", self.state, ev),
                _ => bad_source("acceptor", self.state, ev),
            },

            AcceptorState::Done => {
                trace!(id = %cx.id(), "[ACCEPTOR] ignoring event after close");
            }

            AcceptorState::StoppingSessionFinal | AcceptorState::StoppingStreamFinal => {
                bad_state("acceptor", self.state, ev)
            }
        }
    }

    fn shutdown(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        if ev.is(ACTION, STOP) {
            debug!(id = %cx.id(), state = ?self.state, "[ACCEPTOR] stopping");
            match self.state {
                AcceptorState::Accepting => {
                    if let Some(listener) = self.listener.as_mut() {
                        listener.cancel_accept();
                    }
                    self.finish(cx);
                }
                AcceptorState::Active => {
                    if let Some(session) = self.session {
                        cx.stop(session);
                    }
                    self.state = AcceptorState::StoppingSessionFinal;
                }
                AcceptorState::StoppingSession => {
                    self.state = AcceptorState::StoppingSessionFinal;
                }
                AcceptorState::StoppingStream => {
                    self.state = AcceptorState::StoppingStreamFinal;
                }
                AcceptorState::Idle | AcceptorState::Done => self.finish(cx),
                AcceptorState::StoppingSessionFinal | AcceptorState::StoppingStreamFinal => {
                    bad_state("acceptor", self.state, ev)
                }
            }
            return;
        }

        match (self.state, ev.src, ev.kind) {
            (AcceptorState::StoppingSessionFinal, SRC_SESSION, STOPPED) => {
                if self.close_stream(cx) {
                    self.state = AcceptorState::StoppingStreamFinal;
                } else {
                    self.finish(cx);
                }
            }
            (AcceptorState::StoppingStreamFinal, SRC_STREAM, CLOSED) => {
                self.stream = None;
                self.finish(cx);
            }
            _ => {
                trace!(id = %cx.id(), src = ev.src, kind = ev.kind, "[ACCEPTOR] ignoring event while stopping");
            }
        }
    }

    fn name(&self) -> &'static str {
        "acceptor"
    }
}
