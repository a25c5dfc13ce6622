//! Raw pull pattern: fair-queued receives only.

use crate::pattern::{SocketPattern, EVENT_IN};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::error::{Result, SpindleError};
use spindle_core::fq::FairQueue;
use spindle_core::pipe::{PipeId, PipeRef};

#[derive(Debug, Default)]
pub struct XPull {
    fq: FairQueue,
}

impl XPull {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocketPattern for XPull {
    fn socket_type(&self) -> SocketType {
        SocketType::Pull
    }

    fn add(&mut self, pipe: PipeRef) -> Result<()> {
        self.fq.add(pipe);
        Ok(())
    }

    fn remove(&mut self, id: PipeId) {
        self.fq.remove(id);
    }

    fn pipe_in(&mut self, id: PipeId) {
        self.fq.pipe_in(id);
    }

    /// Pushers never receive, so outbound readiness is ignored.
    fn pipe_out(&mut self, _id: PipeId) {}

    fn events(&self) -> u32 {
        if self.fq.can_recv() {
            EVENT_IN
        } else {
            0
        }
    }

    fn send(&mut self, _msg: Bytes) -> Result<()> {
        Err(SpindleError::NotSupported)
    }

    fn recv(&mut self) -> Result<Bytes> {
        self.fq.recv().map(|(msg, _)| msg)
    }
}
