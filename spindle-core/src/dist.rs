//! Distributor: copies each message to every writable pipe.

use crate::pipe::{PipeId, PipeRef};
use bytes::Bytes;
use hashbrown::HashMap;
use tracing::trace;

/// Fan-out over all registered pipes that are currently writable.
#[derive(Default)]
pub struct Distributor {
    pipes: HashMap<PipeId, PipeRef>,
    writable: HashMap<PipeId, PipeRef>,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("pipes", &self.pipes.len())
            .field("writable", &self.writable.len())
            .finish()
    }
}

impl Distributor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pipe: PipeRef) {
        self.pipes.insert(pipe.id(), pipe);
    }

    pub fn remove(&mut self, id: PipeId) {
        self.pipes.remove(&id);
        self.writable.remove(&id);
    }

    /// The pipe can accept messages again.
    pub fn out(&mut self, id: PipeId) {
        if let Some(pipe) = self.pipes.get(&id) {
            self.writable.insert(id, PipeRef::clone(pipe));
        }
    }

    #[must_use]
    pub fn writable(&self) -> usize {
        self.writable.len()
    }

    /// Sends a copy of `msg` to every writable pipe except `exclude`.
    ///
    /// Pipes that release or fail stop receiving copies until announced
    /// again. Returns the number of pipes that took the message.
    pub fn send(&mut self, msg: &Bytes, exclude: Option<PipeId>) -> usize {
        let mut delivered = 0;
        self.writable.retain(|&id, pipe| {
            if Some(id) == exclude {
                return true;
            }
            match pipe.send(msg.clone()) {
                Ok(status) => {
                    delivered += 1;
                    !status.is_release()
                }
                Err(e) => {
                    trace!(pipe = id, error = %e, "[DIST] dropping copy");
                    false
                }
            }
        });
        delivered
    }
}
