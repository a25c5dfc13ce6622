//! Event identities exchanged between state machines.
//!
//! Every delivery is a `(source, type, source-pointer)` triple. Sources and
//! types are small integers chosen by each machine for its children; the
//! kernel reserves the negative range for its own actions.

use crate::arena::ArenaIndex;
use crate::queue::{QueueLink, Queued};
use std::fmt;

/// Identifies which child (or external collaborator) an event came from.
pub type Src = i32;

/// Event type, meaningful relative to its [`Src`].
pub type EventType = i32;

/// Source used for synchronous kernel actions (`START`, `STOP`).
pub const ACTION: Src = -2;

/// Delivered synchronously by `start`.
pub const START: EventType = -2;

/// Delivered synchronously to the shutdown handler by `stop`.
pub const STOP: EventType = -3;

/// Marker stamped on an event record once it has been delivered.
pub const NONE: i32 = -1;

/// Address of a state machine within its context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsmId(pub(crate) ArenaIndex);

impl FsmId {
    /// Stable integer form, usable as a map key outside the context.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0.to_bits()
    }
}

impl fmt::Debug for FsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FsmId({:?})", self.0)
    }
}

impl fmt::Display for FsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fsm#{:?}", self.0)
    }
}

/// Handle to an event record owned by a state machine.
///
/// An owned event can be raised any number of times, but never while it is
/// still waiting in the queue.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventId(pub(crate) ArenaIndex);

/// One delivery to a state machine handler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FsmEvent {
    pub src: Src,
    pub kind: EventType,
    /// Machine that raised the event, when it lives in the same context.
    pub source: Option<FsmId>,
}

impl FsmEvent {
    #[must_use]
    pub const fn new(src: Src, kind: EventType) -> Self {
        Self {
            src,
            kind,
            source: None,
        }
    }

    /// Synthetic kernel action (`START` / `STOP`).
    #[must_use]
    pub const fn action(kind: EventType) -> Self {
        Self::new(ACTION, kind)
    }

    #[inline]
    #[must_use]
    pub const fn is(&self, src: Src, kind: EventType) -> bool {
        self.src == src && self.kind == kind
    }
}

/// Arena record backing an [`EventId`].
#[derive(Debug)]
pub(crate) struct EventRecord {
    pub(crate) owner: Option<FsmId>,
    pub(crate) target: Option<FsmId>,
    pub(crate) src: Src,
    pub(crate) kind: EventType,
    pub(crate) source: Option<FsmId>,
    link: QueueLink,
}

impl EventRecord {
    pub(crate) fn new(owner: Option<FsmId>) -> Self {
        Self {
            owner,
            target: None,
            src: NONE,
            kind: NONE,
            source: None,
            link: QueueLink::default(),
        }
    }

    #[inline]
    pub(crate) const fn is_queued(&self) -> bool {
        self.link.is_queued()
    }

    /// Takes the pending delivery and resets the record to its idle stamp.
    pub(crate) fn take(&mut self) -> Option<(FsmId, FsmEvent)> {
        let target = self.target.take()?;
        let ev = FsmEvent {
            src: self.src,
            kind: self.kind,
            source: self.source.take(),
        };
        self.src = NONE;
        self.kind = NONE;
        Some((target, ev))
    }
}

impl Queued for EventRecord {
    fn link(&self) -> &QueueLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut QueueLink {
        &mut self.link
    }
}
