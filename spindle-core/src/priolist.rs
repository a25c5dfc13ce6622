//! Priority list of pipes: round-robin within a priority, strict across them.
//!
//! Pipes are grouped in [`SLOTS`] slots by priority (1 = highest). Each slot
//! keeps its active pipes in a ring with a cursor; the list as a whole keeps
//! track of the highest-priority non-empty slot. A pipe is *active* while it
//! is linked into its slot and *dormant* otherwise; only active pipes are
//! ever offered by [`PriorityList::current`].
//!
//! ```text
//! slot 1: [ a ]        <- current slot
//! slot 2: [ b  c* d ]  (* = cursor)
//! slot 8: [ e ]
//! ```

use crate::options::{MAX_PRIORITY, MIN_PRIORITY};
use crate::pipe::PipeId;
use hashbrown::HashMap;
use std::fmt;

/// Number of priority slots.
pub const SLOTS: usize = MAX_PRIORITY as usize;

#[derive(Debug, Clone, Copy)]
struct Links {
    prev: Option<PipeId>,
    next: Option<PipeId>,
}

struct Entry<T> {
    value: T,
    priority: u8,
    /// `Some` while the pipe is active.
    link: Option<Links>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    head: Option<PipeId>,
    tail: Option<PipeId>,
    cursor: Option<PipeId>,
}

/// Priority-ordered set of pipes with round-robin selection.
pub struct PriorityList<T> {
    entries: HashMap<PipeId, Entry<T>>,
    slots: [Slot; SLOTS],
    /// Index of the highest-priority non-empty slot.
    current: Option<usize>,
}

impl<T> Default for PriorityList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            slots: [Slot::default(); SLOTS],
            current: None,
        }
    }

    /// Registers a dormant pipe.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is outside `1..=16` or `id` is already present.
    #[track_caller]
    pub fn add(&mut self, id: PipeId, value: T, priority: u8) {
        assert!(
            (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority),
            "priority {priority} out of range"
        );
        let previous = self.entries.insert(
            id,
            Entry {
                value,
                priority,
                link: None,
            },
        );
        assert!(previous.is_none(), "pipe {id} added twice");
    }

    /// Removes a pipe, active or dormant, keeping the rotation consistent.
    pub fn remove(&mut self, id: PipeId) -> Option<T> {
        let entry = self.entries.get(&id)?;
        if entry.link.is_some() {
            let slot = slot_of(entry.priority);
            let was_cursor = self.slots[slot].cursor == Some(id);
            let next = self.unlink(slot, id);
            if was_cursor {
                self.slots[slot].cursor = next.or(self.slots[slot].head);
                if self.slots[slot].cursor.is_none() && self.current == Some(slot) {
                    self.skip_empty_slots();
                }
            }
        }
        self.entries.remove(&id).map(|e| e.value)
    }

    /// Makes a dormant pipe active at the tail of its slot.
    ///
    /// # Panics
    ///
    /// Panics if the pipe is unknown or already active.
    #[track_caller]
    pub fn activate(&mut self, id: PipeId) {
        let Some(entry) = self.entries.get(&id) else {
            panic!("activating unknown pipe {id}");
        };
        assert!(entry.link.is_none(), "pipe {id} is already active");
        let slot = slot_of(entry.priority);

        let tail = self.slots[slot].tail;
        self.link_mut(id).link = Some(Links {
            prev: tail,
            next: None,
        });
        match tail {
            Some(tail) => self.links_mut(tail).next = Some(id),
            None => self.slots[slot].head = Some(id),
        }
        self.slots[slot].tail = Some(id);

        if self.slots[slot].cursor.is_none() {
            self.slots[slot].cursor = Some(id);
        }
        if self.current.map_or(true, |current| slot < current) {
            self.current = Some(slot);
        }
    }

    /// Returns true if any pipe is active.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the pipe that should serve the next operation.
    #[must_use]
    pub fn current(&self) -> Option<(PipeId, &T)> {
        let id = self.slots[self.current?].cursor?;
        self.entries.get(&id).map(|e| (id, &e.value))
    }

    /// Priority of the current slot.
    #[must_use]
    pub fn priority(&self) -> Option<u8> {
        self.current.map(|slot| (slot + 1) as u8)
    }

    /// Moves past the current pipe. With `release`, the pipe also becomes
    /// dormant until it is activated again.
    ///
    /// # Panics
    ///
    /// Panics if no pipe is active.
    #[track_caller]
    pub fn advance(&mut self, release: bool) {
        let slot = self.current.expect("advance on an empty priority list");
        let cursor = self.slots[slot]
            .cursor
            .expect("current slot has no cursor");

        let next = if release {
            self.unlink(slot, cursor)
        } else {
            self.links(cursor).next
        };
        self.slots[slot].cursor = next.or(self.slots[slot].head);

        if release && self.slots[slot].cursor.is_none() {
            self.skip_empty_slots();
        }
    }

    #[must_use]
    pub fn contains(&self, id: PipeId) -> bool {
        self.entries.contains_key(&id)
    }

    #[must_use]
    pub fn is_pipe_active(&self, id: PipeId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.link.is_some())
    }

    #[must_use]
    pub fn get(&self, id: PipeId) -> Option<&T> {
        self.entries.get(&id).map(|e| &e.value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves `current` forward past empty slots; `None` once past the last.
    fn skip_empty_slots(&mut self) {
        let Some(mut slot) = self.current else {
            return;
        };
        while self.slots[slot].cursor.is_none() {
            slot += 1;
            if slot >= SLOTS {
                self.current = None;
                return;
            }
        }
        self.current = Some(slot);
    }

    /// Unlinks an active pipe, returning its successor within the slot.
    fn unlink(&mut self, slot: usize, id: PipeId) -> Option<PipeId> {
        let links = self
            .link_mut(id)
            .link
            .take()
            .expect("unlinking a dormant pipe");
        match links.prev {
            Some(prev) => self.links_mut(prev).next = links.next,
            None => self.slots[slot].head = links.next,
        }
        match links.next {
            Some(next) => self.links_mut(next).prev = links.prev,
            None => self.slots[slot].tail = links.prev,
        }
        links.next
    }

    fn link_mut(&mut self, id: PipeId) -> &mut Entry<T> {
        self.entries.get_mut(&id).expect("pipe is registered")
    }

    fn links(&self, id: PipeId) -> Links {
        self.entries
            .get(&id)
            .and_then(|e| e.link)
            .expect("pipe is active")
    }

    fn links_mut(&mut self, id: PipeId) -> &mut Links {
        self.link_mut(id).link.as_mut().expect("pipe is active")
    }
}

impl<T> fmt::Debug for PriorityList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for (slot, s) in self.slots.iter().enumerate() {
            let mut ring = Vec::new();
            let mut it = s.head;
            while let Some(id) = it {
                ring.push(id);
                it = self.entries.get(&id).and_then(|e| e.link).and_then(|l| l.next);
            }
            if !ring.is_empty() {
                list.entry(&(slot + 1), &ring);
            }
        }
        list.finish()
    }
}

#[inline]
fn slot_of(priority: u8) -> usize {
    usize::from(priority) - 1
}
