//! Finite state machine primitive.
//!
//! Every stateful object in the core (sockets, listeners, connections,
//! sessions) is a [`StateMachine`] registered in a [`Context`](crate::context::Context).
//! The kernel keeps the generic lifecycle around it:
//!
//! ```text
//! IDLE --start--> ACTIVE --stop--> STOPPING --stopped--> IDLE
//! ```
//!
//! `start` and `stop` are synchronous: the handler sees `(ACTION, START)` or
//! the shutdown handler sees `(ACTION, STOP)` before the caller continues.
//! While `STOPPING`, every delivery goes to [`StateMachine::shutdown`], so
//! teardown can never re-enter business logic.

use crate::context::FsmCx;
use crate::event::{EventId, FsmEvent, FsmId, Src};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt::Debug;
use tracing::error;

/// Generic lifecycle state tracked by the kernel for every machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Active,
    Stopping,
}

/// Upcast helper so handlers can be reached by concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour of a state machine: the normal handler and the shutdown handler.
pub trait StateMachine: AsAny + Send + 'static {
    /// Handles events while the machine is `IDLE` or `ACTIVE`.
    fn handle(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent);

    /// Handles every event while the machine is `STOPPING`, starting with
    /// `(ACTION, STOP)`. Must eventually call [`FsmCx::stopped`].
    fn shutdown(&mut self, cx: &mut FsmCx<'_>, ev: FsmEvent);

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "fsm"
    }
}

/// Kernel-side bookkeeping of a machine.
#[derive(Debug)]
pub(crate) struct FsmCore {
    pub(crate) state: FsmState,
    pub(crate) src: Src,
    pub(crate) owner: Option<FsmId>,
    pub(crate) stopped: EventId,
    /// Every event record this machine owns, freed with the machine.
    pub(crate) events: SmallVec<[EventId; 4]>,
}

impl FsmCore {
    pub(crate) fn new(owner: Option<FsmId>, src: Src, stopped: EventId) -> Self {
        let mut events = SmallVec::new();
        events.push(stopped);
        Self {
            state: FsmState::Idle,
            src,
            owner,
            stopped,
            events,
        }
    }
}

/// Aborts on a state/event combination the machine does not expect.
#[track_caller]
#[cold]
pub fn bad_state(machine: &str, state: impl Debug, ev: FsmEvent) -> ! {
    error!(machine, ?state, src = ev.src, kind = ev.kind, "unexpected state");
    panic!(
        "{machine}: bad state {state:?} (src={}, type={})",
        ev.src, ev.kind
    );
}

/// Aborts on an event type the machine does not expect from a known source.
#[track_caller]
#[cold]
pub fn bad_action(machine: &str, state: impl Debug, ev: FsmEvent) -> ! {
    error!(machine, ?state, src = ev.src, kind = ev.kind, "unexpected action");
    panic!(
        "{machine}: bad action in state {state:?} (src={}, type={})",
        ev.src, ev.kind
    );
}

/// Aborts on an event from a source the machine does not know.
#[track_caller]
#[cold]
pub fn bad_source(machine: &str, state: impl Debug, ev: FsmEvent) -> ! {
    error!(machine, ?state, src = ev.src, kind = ev.kind, "unexpected source");
    panic!(
        "{machine}: bad source in state {state:?} (src={}, type={})",
        ev.src, ev.kind
    );
}
