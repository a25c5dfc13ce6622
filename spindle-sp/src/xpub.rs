//! Raw publisher pattern: every message is copied to every writable peer.
//!
//! Peers that are not writable when a message is published miss it.

use crate::pattern::{SocketPattern, EVENT_OUT};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::dist::Distributor;
use spindle_core::error::{Result, SpindleError};
use spindle_core::pipe::{PipeId, PipeRef};
use tracing::trace;

#[derive(Debug, Default)]
pub struct XPub {
    dist: Distributor,
}

impl XPub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocketPattern for XPub {
    fn socket_type(&self) -> SocketType {
        SocketType::Pub
    }

    fn add(&mut self, pipe: PipeRef) -> Result<()> {
        self.dist.add(pipe);
        Ok(())
    }

    fn remove(&mut self, id: PipeId) {
        self.dist.remove(id);
    }

    fn pipe_in(&mut self, _id: PipeId) {}

    fn pipe_out(&mut self, id: PipeId) {
        self.dist.out(id);
    }

    /// Publishing never blocks, so the socket is always writable.
    fn events(&self) -> u32 {
        EVENT_OUT
    }

    fn send(&mut self, msg: Bytes) -> Result<()> {
        let delivered = self.dist.send(&msg, None);
        trace!(delivered, len = msg.len(), "[XPUB] published");
        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes> {
        Err(SpindleError::NotSupported)
    }
}
