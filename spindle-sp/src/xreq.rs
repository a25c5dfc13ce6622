//! Raw request pattern: load-balanced sends, fair-queued receives.
//!
//! Requests go to one peer of the best send priority; replies are collected
//! from whichever peers have them. Request/reply correlation is left to the
//! layer above.

use crate::pattern::{SocketPattern, EVENT_IN, EVENT_OUT};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::error::Result;
use spindle_core::fq::FairQueue;
use spindle_core::lb::LoadBalancer;
use spindle_core::pipe::{PipeId, PipeRef};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
pub struct XReq {
    lb: LoadBalancer,
    fq: FairQueue,
}

impl XReq {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `msg` and reports which pipe took it.
    pub fn send_to(&mut self, msg: Bytes) -> Result<PipeId> {
        let id = self.lb.send(msg)?;
        trace!(pipe = id, "[XREQ] request sent");
        Ok(id)
    }
}

impl SocketPattern for XReq {
    fn socket_type(&self) -> SocketType {
        SocketType::Req
    }

    fn add(&mut self, pipe: PipeRef) -> Result<()> {
        self.lb.add(Arc::clone(&pipe));
        self.fq.add(pipe);
        Ok(())
    }

    fn remove(&mut self, id: PipeId) {
        self.lb.remove(id);
        self.fq.remove(id);
    }

    fn pipe_in(&mut self, id: PipeId) {
        self.fq.pipe_in(id);
    }

    fn pipe_out(&mut self, id: PipeId) {
        self.lb.out(id);
    }

    fn events(&self) -> u32 {
        let mut events = 0;
        if self.fq.can_recv() {
            events |= EVENT_IN;
        }
        if self.lb.can_send() {
            events |= EVENT_OUT;
        }
        events
    }

    fn send(&mut self, msg: Bytes) -> Result<()> {
        self.send_to(msg).map(|_| ())
    }

    fn recv(&mut self) -> Result<Bytes> {
        self.fq.recv().map(|(msg, _)| msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::inproc;
    use spindle_core::options::PipeOptions;
    use spindle_core::pipe::Pipe;

    #[test]
    fn test_requests_rotate_and_replies_are_collected() {
        let mut xreq = XReq::new();
        let (a, a_peer) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 8);
        let (b, b_peer) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 8);
        let (a_id, b_id) = (a.id(), b.id());
        xreq.add(Arc::new(a)).unwrap();
        xreq.add(Arc::new(b)).unwrap();
        assert_eq!(xreq.events(), 0);

        xreq.pipe_out(a_id);
        xreq.pipe_out(b_id);
        assert_eq!(xreq.events(), EVENT_OUT);
        assert_eq!(xreq.send_to(Bytes::from_static(b"r1")).unwrap(), a_id);
        assert_eq!(xreq.send_to(Bytes::from_static(b"r2")).unwrap(), b_id);
        assert_eq!(a_peer.recv().unwrap().0, "r1");
        assert_eq!(b_peer.recv().unwrap().0, "r2");

        b_peer.send(Bytes::from_static(b"reply")).unwrap();
        xreq.pipe_in(b_id);
        assert_eq!(xreq.events(), EVENT_IN | EVENT_OUT);
        assert_eq!(xreq.recv().unwrap(), "reply");
        assert!(xreq.recv().unwrap_err().is_again());
    }

    #[test]
    fn test_removed_pipe_is_forgotten() {
        let mut xreq = XReq::new();
        let (a, _peer) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 1);
        let id = a.id();
        xreq.add(Arc::new(a)).unwrap();
        xreq.pipe_out(id);
        xreq.remove(id);
        assert_eq!(xreq.events(), 0);
        assert!(xreq.send(Bytes::from_static(b"x")).unwrap_err().is_again());
    }
}
