//! Load balancer: sends each message to one pipe of the best send priority.

use crate::error::{Result, SpindleError};
use crate::pipe::{PipeId, PipeRef};
use crate::priolist::PriorityList;
use bytes::Bytes;
use tracing::trace;

/// Outbound distribution over a [`PriorityList`] keyed by send priority.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    pipes: PriorityList<PipeRef>,
}

impl LoadBalancer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipe. It takes part once it is announced with [`out`](Self::out).
    pub fn add(&mut self, pipe: PipeRef) {
        let priority = pipe.options().send_priority;
        self.pipes.add(pipe.id(), pipe, priority);
    }

    pub fn remove(&mut self, id: PipeId) {
        self.pipes.remove(id);
    }

    /// The pipe can accept messages again.
    pub fn out(&mut self, id: PipeId) {
        self.pipes.activate(id);
    }

    #[must_use]
    pub fn can_send(&self) -> bool {
        self.pipes.is_active()
    }

    /// Send priority of the pipe that would take the next message.
    #[must_use]
    pub fn priority(&self) -> Option<u8> {
        self.pipes.priority()
    }

    /// Sends `msg` to the current pipe and rotates. Returns the pipe used.
    ///
    /// Fails with [`SpindleError::Again`] when no pipe is active.
    pub fn send(&mut self, msg: Bytes) -> Result<PipeId> {
        let Some((id, pipe)) = self.pipes.current() else {
            return Err(SpindleError::Again);
        };
        match pipe.send(msg) {
            Ok(status) => {
                trace!(pipe = id, ?status, "[LB] sent");
                self.pipes.advance(status.is_release());
                Ok(id)
            }
            Err(e) => {
                trace!(pipe = id, error = %e, "[LB] pipe refused message");
                self.pipes.advance(true);
                Err(e)
            }
        }
    }
}
