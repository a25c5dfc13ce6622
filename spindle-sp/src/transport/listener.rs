//! Bound endpoint: keeps one pending acceptor and the list of connections.
//!
//! Shutdown runs in three steps: stop the pending acceptor and take the
//! listening socket back, close the listening socket, stop every connection.

use super::acceptor::Acceptor;
use super::{RawListener, ACCEPTED, CLOSED, ERROR, STOPPED};
use spindle_core::context::FsmCx;
use spindle_core::event::{FsmEvent, FsmId, Src, ACTION, START, STOP};
use spindle_core::fsm::{bad_action, bad_source, bad_state, StateMachine};
use spindle_core::stats::StatsSink;
use tracing::{debug, trace};

const SRC_RAW: Src = 1;
const SRC_ACCEPTOR: Src = 2;
const SRC_CONNECTION: Src = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Idle,
    Active,
    StoppingAcceptor,
    StoppingListener,
    StoppingConnections,
}

pub(crate) struct Listener {
    state: ListenerState,
    /// The listening socket, while no acceptor has borrowed it.
    raw: Option<Box<dyn RawListener>>,
    acceptor: Option<FsmId>,
    connections: Vec<FsmId>,
    socket: FsmId,
    stats: StatsSink,
}

impl Listener {
    pub(crate) fn new(raw: Box<dyn RawListener>, socket: FsmId, stats: StatsSink) -> Self {
        Self {
            state: ListenerState::Idle,
            raw: Some(raw),
            acceptor: None,
            connections: Vec::new(),
            socket,
            stats,
        }
    }

    /// Lends the listening socket to a fresh acceptor.
    fn start_acceptor(&mut self, cx: &mut FsmCx<'_>) {
        let raw = self
            .raw
            .take()
            .expect("listening socket is back before a new accept");
        let acceptor = cx.spawn(
            Acceptor::new(raw, self.socket, self.stats.clone()),
            SRC_ACCEPTOR,
        );
        cx.start(acceptor);
        self.acceptor = Some(acceptor);
        trace!(id = %cx.id(), %acceptor, "[LISTENER] acceptor started");
    }

    /// The pending acceptor got a connection: take the socket back and keep
    /// the acceptor as a connection.
    fn promote(&mut self, cx: &mut FsmCx<'_>, acceptor: FsmId) {
        debug_assert_eq!(self.acceptor, Some(acceptor));
        self.acceptor = None;
        let raw = cx.with::<Acceptor, _>(acceptor, |a, _| a.take_listener());
        if raw.is_some() {
            self.raw = raw;
        }
        let me = cx.id();
        cx.swap_owner(acceptor, me, SRC_CONNECTION);
        self.connections.push(acceptor);
        debug!(id = %me, connections = self.connections.len(), "[LISTENER] connection added");
    }

    fn reap(&mut self, cx: &mut FsmCx<'_>, connection: FsmId) {
        self.connections.retain(|&c| c != connection);
        drop(cx.remove(connection));
        debug!(id = %cx.id(), connections = self.connections.len(), "[LISTENER] connection removed");
    }

    fn close_raw(&mut self, cx: &mut FsmCx<'_>) {
        match self.raw.as_mut() {
            Some(raw) => {
                raw.close(cx.handle(SRC_RAW));
                self.state = ListenerState::StoppingListener;
            }
            None => self.stop_connections(cx),
        }
    }

    fn stop_connections(&mut self, cx: &mut FsmCx<'_>) {
        self.state = ListenerState::StoppingConnections;
        for &connection in &self.connections {
            cx.stop(connection);
        }
        self.finish_if_empty(cx);
    }

    fn finish_if_empty(&mut self, cx: &mut FsmCx<'_>) {
        if self.state == ListenerState::StoppingConnections && self.connections.is_empty() {
            debug!(id = %cx.id(), "[LISTENER] stopped");
            self.state = ListenerState::Idle;
            cx.stopped(STOPPED);
        }
    }
}

impl StateMachine for Listener {
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        trace!(id = %cx.id(), state = ?self.state, src = ev.src, kind = ev.kind, "[LISTENER] event");
        match self.state {
            ListenerState::Idle => {
                if !ev.is(ACTION, START) {
                    bad_state("listener", self.state, ev);
                }
                debug!(id = %cx.id(), "[LISTENER] listening");
                self.start_acceptor(cx);
                self.state = ListenerState::Active;
            }

            ListenerState::Active => match (ev.src, ev.source) {
                (SRC_ACCEPTOR, Some(acceptor)) if ev.kind == ACCEPTED => {
                    self.promote(cx, acceptor);
                    self.start_acceptor(cx);
                }
                (SRC_ACCEPTOR, _) => bad_action("listener", self.state, ev),
                (SRC_CONNECTION, Some(connection)) => match ev.kind {
                    ERROR => cx.stop(connection),
                    STOPPED => self.reap(cx, connection),
                    _ => bad_action("listener", self.state, ev),
                },
                _ => bad_source("listener", self.state, ev),
            },

            ListenerState::StoppingAcceptor
            | ListenerState::StoppingListener
            | ListenerState::StoppingConnections => bad_state("listener", self.state, ev),
        }
    }

    fn shutdown(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent) {
        if ev.is(ACTION, STOP) {
            debug!(id = %cx.id(), connections = self.connections.len(), "[LISTENER] stopping");
            self.state = ListenerState::StoppingAcceptor;
            match self.acceptor {
                Some(acceptor) => cx.stop(acceptor),
                None => self.close_raw(cx),
            }
            return;
        }

        match (self.state, ev.src, ev.kind, ev.source) {
            // The acceptor had already accepted when the stop came in; it is
            // a connection now and is being torn down as one.
            (ListenerState::StoppingAcceptor, SRC_ACCEPTOR, ACCEPTED, Some(acceptor)) => {
                self.promote(cx, acceptor);
                self.close_raw(cx);
            }
            (ListenerState::StoppingAcceptor, SRC_ACCEPTOR, STOPPED, Some(acceptor)) => {
                self.acceptor = None;
                let raw = cx.with::<Acceptor, _>(acceptor, |a, _| a.take_listener());
                if raw.is_some() {
                    self.raw = raw;
                }
                drop(cx.remove(acceptor));
                self.close_raw(cx);
            }
            (ListenerState::StoppingListener, SRC_RAW, CLOSED, _) => {
                self.raw = None;
                self.stop_connections(cx);
            }
            (_, SRC_CONNECTION, STOPPED, Some(connection)) => {
                self.reap(cx, connection);
                self.finish_if_empty(cx);
            }
            (_, SRC_CONNECTION, ERROR, Some(connection)) => {
                if self.state == ListenerState::StoppingConnections {
                    cx.stop(connection);
                }
            }
            _ => {
                trace!(id = %cx.id(), src = ev.src, kind = ev.kind, "[LISTENER] ignoring event while stopping");
            }
        }
    }

    fn name(&self) -> &'static str {
        "listener"
    }
}
