//! Raw pair pattern: one peer, both directions.

use crate::pattern::{SocketPattern, EVENT_IN, EVENT_OUT};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::error::Result;
use spindle_core::excl::Exclusive;
use spindle_core::pipe::{PipeId, PipeRef};

#[derive(Debug, Default)]
pub struct XPair {
    excl: Exclusive,
}

impl XPair {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocketPattern for XPair {
    fn socket_type(&self) -> SocketType {
        SocketType::Pair
    }

    /// Fails with `AlreadyConnected` while another peer is attached.
    fn add(&mut self, pipe: PipeRef) -> Result<()> {
        self.excl.add(pipe)
    }

    fn remove(&mut self, id: PipeId) {
        self.excl.remove(id);
    }

    fn pipe_in(&mut self, id: PipeId) {
        self.excl.pipe_in(id);
    }

    fn pipe_out(&mut self, id: PipeId) {
        self.excl.pipe_out(id);
    }

    fn events(&self) -> u32 {
        let mut events = 0;
        if self.excl.can_recv() {
            events |= EVENT_IN;
        }
        if self.excl.can_send() {
            events |= EVENT_OUT;
        }
        events
    }

    fn send(&mut self, msg: Bytes) -> Result<()> {
        self.excl.send(msg)
    }

    fn recv(&mut self) -> Result<Bytes> {
        self.excl.recv()
    }
}
