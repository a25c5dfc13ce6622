//! Intrusive FIFO queue over arena-resident items.
//!
//! Items carry their own [`QueueLink`]; the queue only stores head and tail
//! indices. Membership is explicit (`QueueLink::is_queued`), so an item can be
//! checked, pushed, popped, or unlinked from the middle in O(1) without any
//! allocation.

use crate::arena::{Arena, ArenaIndex};

#[derive(Debug, Clone, Copy)]
struct Links {
    prev: Option<ArenaIndex>,
    next: Option<ArenaIndex>,
}

/// Per-item queue linkage. `None` means "not in any queue".
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueLink {
    links: Option<Links>,
}

impl QueueLink {
    /// Returns true if the owning item is currently queued.
    #[inline]
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        self.links.is_some()
    }
}

/// Items that can be placed on a [`Queue`].
pub trait Queued {
    fn link(&self) -> &QueueLink;
    fn link_mut(&mut self) -> &mut QueueLink;
}

/// FIFO of arena indices linked through the items themselves.
#[derive(Debug, Default)]
pub struct Queue {
    head: Option<ArenaIndex>,
    tail: Option<ArenaIndex>,
    len: usize,
}

impl Queue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Appends `idx` at the tail.
    ///
    /// # Panics
    ///
    /// Panics if the item is already queued or `idx` is stale.
    #[track_caller]
    pub fn push<T: Queued>(&mut self, arena: &mut Arena<T>, idx: ArenaIndex) {
        let item = &mut arena[idx];
        assert!(!item.link().is_queued(), "item {idx:?} is already queued");
        item.link_mut().links = Some(Links {
            prev: self.tail,
            next: None,
        });

        match self.tail {
            Some(tail) => set_next(arena, tail, Some(idx)),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    /// Removes and returns the head of the queue.
    pub fn pop<T: Queued>(&mut self, arena: &mut Arena<T>) -> Option<ArenaIndex> {
        let head = self.head?;
        self.unlink(arena, head);
        Some(head)
    }

    /// Unlinks `idx` from anywhere in the queue. Returns false if it was not queued.
    pub fn remove<T: Queued>(&mut self, arena: &mut Arena<T>, idx: ArenaIndex) -> bool {
        match arena.get(idx) {
            Some(item) if item.link().is_queued() => {
                self.unlink(arena, idx);
                true
            }
            _ => false,
        }
    }

    fn unlink<T: Queued>(&mut self, arena: &mut Arena<T>, idx: ArenaIndex) {
        let links = arena[idx]
            .link_mut()
            .links
            .take()
            .expect("unlinking an item that is not queued");

        match links.prev {
            Some(prev) => set_next(arena, prev, links.next),
            None => self.head = links.next,
        }
        match links.next {
            Some(next) => set_prev(arena, next, links.prev),
            None => self.tail = links.prev,
        }
        self.len -= 1;
    }
}

fn set_next<T: Queued>(arena: &mut Arena<T>, idx: ArenaIndex, next: Option<ArenaIndex>) {
    if let Some(links) = arena[idx].link_mut().links.as_mut() {
        links.next = next;
    }
}

fn set_prev<T: Queued>(arena: &mut Arena<T>, idx: ArenaIndex, prev: Option<ArenaIndex>) {
    if let Some(links) = arena[idx].link_mut().links.as_mut() {
        links.prev = prev;
    }
}
