//! Execution context: the unit of mutual exclusion for state machines.
//!
//! A [`Context`] owns a set of state machines and a local FIFO of raised
//! events. Entering the context takes its lock; leaving it drains every event
//! raised in the meantime (including ones raised while draining), runs the
//! optional leave hook, releases the lock, and only then delivers the events
//! addressed to other contexts. No handler ever runs outside the context lock
//! and no two contexts are ever locked by the same delivery.
//!
//! ```text
//! enter ──► handlers raise ──► leave: drain local ─► on_leave ─► unlock ─► deliver cross
//! ```

use crate::arena::Arena;
use crate::event::{EventId, EventRecord, EventType, FsmEvent, FsmId, Src, NONE, START, STOP};
use crate::fsm::{FsmCore, FsmState, StateMachine};
use crate::queue::Queue;
use crate::worker::Worker;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Machine {
    core: FsmCore,
    /// `None` while the handler is executing.
    handler: Option<Box<dyn StateMachine>>,
}

/// Event bound for a machine in another context.
struct CrossEvent {
    dst: FsmHandle,
    kind: EventType,
}

type LeaveHook = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub(crate) struct ContextState {
    machines: Arena<Machine>,
    events: Arena<EventRecord>,
    local: Queue,
    cross: Vec<CrossEvent>,
    on_leave: Option<LeaveHook>,
}

/// A lock-protected group of state machines sharing one event queue.
pub struct Context {
    id: u64,
    state: Mutex<ContextState>,
    worker: Option<Worker>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("worker", &self.worker.as_ref().map(Worker::id))
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context driven only by the threads that enter it.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Creates a context whose asynchronous completions run on `worker`.
    #[must_use]
    pub fn with_worker(worker: Worker) -> Arc<Self> {
        Self::build(Some(worker))
    }

    fn build(worker: Option<Worker>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(ContextState::default()),
            worker,
        })
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn worker(&self) -> Option<&Worker> {
        self.worker.as_ref()
    }

    /// Acquires the context lock.
    ///
    /// The lock is not re-entrant: entering a context from a handler running
    /// inside it deadlocks. Use [`FsmCx`] operations instead.
    pub fn enter(self: &Arc<Self>) -> Entered<'_> {
        Entered {
            ctx: self,
            guard: Some(self.state.lock()),
        }
    }

    /// Enters, delivers one event to `target`, and leaves.
    pub fn feed(self: &Arc<Self>, target: FsmId, ev: FsmEvent) {
        let mut entered = self.enter();
        entered.feed(target, ev);
        entered.leave();
    }
}

/// Guard for an entered context. Dropping it leaves the context.
pub struct Entered<'a> {
    ctx: &'a Arc<Context>,
    guard: Option<MutexGuard<'a, ContextState>>,
}

impl Entered<'_> {
    fn state(&mut self) -> &mut ContextState {
        self.guard
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("context already left"))
    }

    /// Registers a machine with no owner (a socket, typically).
    pub fn insert_root(&mut self, machine: impl StateMachine) -> FsmId {
        self.state().insert(Box::new(machine), None, NONE)
    }

    /// Installs the hook run after the local queue drains on every leave.
    pub fn set_on_leave(&mut self, hook: impl FnMut() + Send + 'static) {
        self.state().on_leave = Some(Box::new(hook));
    }

    pub fn start(&mut self, id: FsmId) {
        let ctx = self.ctx;
        self.state().start(ctx, id);
    }

    pub fn stop(&mut self, id: FsmId) {
        let ctx = self.ctx;
        self.state().stop(ctx, id);
    }

    /// Delivers `ev` to `target` synchronously, routed on its lifecycle state.
    pub fn feed(&mut self, target: FsmId, ev: FsmEvent) {
        let ctx = self.ctx;
        self.state().feed(ctx, target, ev);
    }

    #[must_use]
    pub fn is_idle(&mut self, id: FsmId) -> bool {
        self.state().is_idle(id)
    }

    #[must_use]
    pub fn fsm_state(&mut self, id: FsmId) -> Option<FsmState> {
        self.state().machines.get(id.0).map(|m| m.core.state)
    }

    #[must_use]
    pub fn contains(&mut self, id: FsmId) -> bool {
        self.state().machines.contains(id.0)
    }

    /// Unregisters an idle machine and returns its handler.
    pub fn remove(&mut self, id: FsmId) -> Box<dyn StateMachine> {
        self.state().remove(id)
    }

    /// Runs `f` against the machine `id` downcast to `T`.
    pub fn with<T, R>(&mut self, id: FsmId, f: impl FnOnce(&mut T, &mut FsmCx<'_>) -> R) -> R
    where
        T: StateMachine,
    {
        let ctx = self.ctx;
        self.state().with(ctx, id, f)
    }

    #[must_use]
    pub fn handle(&self, id: FsmId, src: Src) -> FsmHandle {
        FsmHandle::new(Arc::clone(self.ctx), id, src)
    }

    /// Leaves the context explicitly. Equivalent to dropping the guard.
    pub fn leave(mut self) {
        self.leave_inner();
    }

    fn leave_inner(&mut self) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };
        if std::thread::panicking() {
            return;
        }

        guard.drain(self.ctx);
        if let Some(hook) = guard.on_leave.as_mut() {
            hook();
        }
        let cross = std::mem::take(&mut guard.cross);
        drop(guard);

        for ev in cross {
            trace!(
                from = self.ctx.id,
                to = ev.dst.ctx.id,
                kind = ev.kind,
                "delivering cross-context event"
            );
            ev.dst.post(ev.kind);
        }
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.leave_inner();
    }
}

enum Route {
    Handle,
    Shutdown,
}

impl ContextState {
    fn insert(&mut self, handler: Box<dyn StateMachine>, owner: Option<FsmId>, src: Src) -> FsmId {
        let stopped = EventId(self.events.insert(EventRecord::new(None)));
        let id = FsmId(self.machines.insert(Machine {
            core: FsmCore::new(owner, src, stopped),
            handler: Some(handler),
        }));
        self.events[stopped.0].owner = Some(id);
        trace!(%id, ?owner, src, "fsm registered");
        id
    }

    fn core(&self, id: FsmId) -> &FsmCore {
        match self.machines.get(id.0) {
            Some(m) => &m.core,
            None => panic!("{id} is not registered in this context"),
        }
    }

    fn core_mut(&mut self, id: FsmId) -> &mut FsmCore {
        match self.machines.get_mut(id.0) {
            Some(m) => &mut m.core,
            None => panic!("{id} is not registered in this context"),
        }
    }

    fn is_idle(&self, id: FsmId) -> bool {
        let core = self.core(id);
        core.state == FsmState::Idle && !self.events[core.stopped.0].is_queued()
    }

    fn start(&mut self, ctx: &Arc<Context>, id: FsmId) {
        assert!(self.is_idle(id), "{id} started while not idle");
        self.invoke(ctx, id, FsmEvent::action(START), Route::Handle);
        self.core_mut(id).state = FsmState::Active;
    }

    fn stop(&mut self, ctx: &Arc<Context>, id: FsmId) {
        let core = self.core_mut(id);
        if core.state != FsmState::Active {
            return;
        }
        core.state = FsmState::Stopping;
        self.invoke(ctx, id, FsmEvent::action(STOP), Route::Shutdown);
    }

    fn feed(&mut self, ctx: &Arc<Context>, target: FsmId, ev: FsmEvent) {
        let Some(machine) = self.machines.get(target.0) else {
            trace!(%target, src = ev.src, kind = ev.kind, "dropping event for removed fsm");
            return;
        };
        let route = match machine.core.state {
            FsmState::Stopping => Route::Shutdown,
            FsmState::Idle | FsmState::Active => Route::Handle,
        };
        self.invoke(ctx, target, ev, route);
    }

    fn invoke(&mut self, ctx: &Arc<Context>, id: FsmId, ev: FsmEvent, route: Route) {
        let mut handler = self.machines[id.0]
            .handler
            .take()
            .unwrap_or_else(|| panic!("re-entrant delivery to {id}"));
        {
            let mut cx = FsmCx {
                state: self,
                ctx,
                id,
            };
            match route {
                Route::Handle => handler.handle(&mut cx, ev),
                Route::Shutdown => handler.shutdown(&mut cx, ev),
            }
        }
        self.machines[id.0].handler = Some(handler);
    }

    fn with<T, R>(
        &mut self,
        ctx: &Arc<Context>,
        id: FsmId,
        f: impl FnOnce(&mut T, &mut FsmCx<'_>) -> R,
    ) -> R
    where
        T: StateMachine,
    {
        let mut handler = self.machines[id.0]
            .handler
            .take()
            .unwrap_or_else(|| panic!("{id} is already borrowed"));
        let result = {
            let Some(machine) = (*handler).as_any_mut().downcast_mut::<T>() else {
                panic!("{id} is not a {}", std::any::type_name::<T>());
            };
            let mut cx = FsmCx {
                state: self,
                ctx,
                id,
            };
            f(machine, &mut cx)
        };
        self.machines[id.0].handler = Some(handler);
        result
    }

    fn remove(&mut self, id: FsmId) -> Box<dyn StateMachine> {
        assert!(self.is_idle(id), "{id} removed while not idle");
        let machine = self
            .machines
            .remove(id.0)
            .unwrap_or_else(|| unreachable!("checked by is_idle"));
        for ev in machine.core.events {
            self.local.remove(&mut self.events, ev.0);
            self.events.remove(ev.0);
        }
        trace!(%id, "fsm removed");
        machine
            .handler
            .unwrap_or_else(|| panic!("{id} removed while executing"))
    }

    fn push(&mut self, event: EventId, target: FsmId, src: Src, kind: EventType, source: FsmId) {
        let record = &mut self.events[event.0];
        assert!(!record.is_queued(), "event {event:?} raised while queued");
        debug_assert_eq!(record.owner, Some(source), "event {event:?} raised by a non-owner");
        record.target = Some(target);
        record.src = src;
        record.kind = kind;
        record.source = Some(source);
        self.local.push(&mut self.events, event.0);
    }

    /// Delivers queued events until the queue is empty, including events
    /// raised by the handlers it runs.
    fn drain(&mut self, ctx: &Arc<Context>) {
        while let Some(idx) = self.local.pop(&mut self.events) {
            if let Some((target, ev)) = self.events[idx].take() {
                self.feed(ctx, target, ev);
            }
        }
    }
}

/// Operations available to a handler while it runs inside its context.
pub struct FsmCx<'a> {
    state: &'a mut ContextState,
    ctx: &'a Arc<Context>,
    id: FsmId,
}

impl FsmCx<'_> {
    /// Id of the machine this handler belongs to.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> FsmId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> Option<FsmId> {
        self.state.core(self.id).owner
    }

    #[must_use]
    pub fn fsm_state(&self) -> FsmState {
        self.state.core(self.id).state
    }

    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        self.ctx
    }

    /// Allocates an event record owned by this machine.
    pub fn new_event(&mut self) -> EventId {
        let id = EventId(self.state.events.insert(EventRecord::new(Some(self.id))));
        self.state.core_mut(self.id).events.push(id);
        id
    }

    /// Returns true if `event` is waiting in the queue.
    #[must_use]
    pub fn is_queued(&self, event: EventId) -> bool {
        self.state.events[event.0].is_queued()
    }

    /// Queues `event` to this machine's owner, stamped with this machine's
    /// source id.
    ///
    /// # Panics
    ///
    /// Panics if `event` is still queued or the machine has no owner.
    #[track_caller]
    pub fn raise(&mut self, event: EventId, kind: EventType) {
        let core = self.state.core(self.id);
        let owner = core
            .owner
            .unwrap_or_else(|| panic!("{} raised an event without an owner", self.id));
        let src = core.src;
        self.state.push(event, owner, src, kind, self.id);
    }

    /// Queues `event` to an arbitrary machine of this context.
    #[track_caller]
    pub fn raise_at(&mut self, event: EventId, target: FsmId, src: Src, kind: EventType) {
        self.state.push(event, target, src, kind, self.id);
    }

    /// Queues a delivery to a machine in another context. It is handed over
    /// after this context unlocks.
    pub fn raise_to(&mut self, dst: &FsmHandle, kind: EventType) {
        self.state.cross.push(CrossEvent {
            dst: dst.clone(),
            kind,
        });
    }

    /// Registers `machine` as a child of this machine.
    pub fn spawn(&mut self, machine: impl StateMachine, src: Src) -> FsmId {
        self.state.insert(Box::new(machine), Some(self.id), src)
    }

    pub fn start(&mut self, child: FsmId) {
        self.state.start(self.ctx, child);
    }

    /// Begins stopping `child`. No-op unless it is active.
    pub fn stop(&mut self, child: FsmId) {
        self.state.stop(self.ctx, child);
    }

    #[must_use]
    pub fn is_idle(&self, child: FsmId) -> bool {
        self.state.is_idle(child)
    }

    /// Returns true if `id` is still registered in this context.
    #[must_use]
    pub fn contains(&self, id: FsmId) -> bool {
        self.state.machines.contains(id.0)
    }

    pub fn remove(&mut self, child: FsmId) -> Box<dyn StateMachine> {
        self.state.remove(child)
    }

    /// Runs `f` against `child` downcast to `T`, with the child's own context
    /// operations.
    pub fn with<T, R>(&mut self, child: FsmId, f: impl FnOnce(&mut T, &mut FsmCx<'_>) -> R) -> R
    where
        T: StateMachine,
    {
        self.state.with(self.ctx, child, f)
    }

    /// Re-parents `child`, returning its previous `(owner, src)`.
    pub fn swap_owner(&mut self, child: FsmId, owner: FsmId, src: Src) -> (Option<FsmId>, Src) {
        let core = self.state.core_mut(child);
        let previous = (core.owner, core.src);
        core.owner = Some(owner);
        core.src = src;
        previous
    }

    /// Finishes shutdown: notifies the owner with `kind` and returns to idle.
    #[track_caller]
    pub fn stopped(&mut self, kind: EventType) {
        let core = self.state.core(self.id);
        assert_eq!(core.state, FsmState::Stopping, "{} stopped while not stopping", self.id);
        let stopped = core.stopped;
        self.raise(stopped, kind);
        self.state.core_mut(self.id).state = FsmState::Idle;
    }

    /// Finishes shutdown without notifying anybody. Used by root machines.
    #[track_caller]
    pub fn stopped_noevent(&mut self) {
        let core = self.state.core_mut(self.id);
        assert_eq!(core.state, FsmState::Stopping, "{} stopped while not stopping", self.id);
        core.state = FsmState::Idle;
    }

    /// Address of this machine for deliveries from outside the context.
    #[must_use]
    pub fn handle(&self, src: Src) -> FsmHandle {
        FsmHandle::new(Arc::clone(self.ctx), self.id, src)
    }
}

/// Thread-safe address of a state machine: context, target and source stamp.
///
/// Transport completions and worker tasks use it to feed events into a
/// machine from outside its context.
#[derive(Clone)]
pub struct FsmHandle {
    ctx: Arc<Context>,
    target: FsmId,
    src: Src,
}

impl FsmHandle {
    #[must_use]
    pub const fn new(ctx: Arc<Context>, target: FsmId, src: Src) -> Self {
        Self { ctx, target, src }
    }

    #[must_use]
    pub const fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    #[must_use]
    pub const fn target(&self) -> FsmId {
        self.target
    }

    #[must_use]
    pub const fn src(&self) -> Src {
        self.src
    }

    /// Enters the target context and delivers `(src, kind)`.
    ///
    /// Must not be called from inside the target context; handlers use
    /// [`FsmCx::raise_to`] for that.
    pub fn post(&self, kind: EventType) {
        self.ctx.feed(self.target, FsmEvent::new(self.src, kind));
    }
}

impl fmt::Debug for FsmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsmHandle")
            .field("context", &self.ctx.id)
            .field("target", &self.target)
            .field("src", &self.src)
            .finish()
    }
}
