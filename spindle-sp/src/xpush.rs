//! Raw push pattern: load-balanced sends only.

use crate::pattern::{SocketPattern, EVENT_OUT};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::error::{Result, SpindleError};
use spindle_core::lb::LoadBalancer;
use spindle_core::pipe::{PipeId, PipeRef};

#[derive(Debug, Default)]
pub struct XPush {
    lb: LoadBalancer,
}

impl XPush {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocketPattern for XPush {
    fn socket_type(&self) -> SocketType {
        SocketType::Push
    }

    fn add(&mut self, pipe: PipeRef) -> Result<()> {
        self.lb.add(pipe);
        Ok(())
    }

    fn remove(&mut self, id: PipeId) {
        self.lb.remove(id);
    }

    /// Pullers never send, so inbound readiness is ignored.
    fn pipe_in(&mut self, _id: PipeId) {}

    fn pipe_out(&mut self, id: PipeId) {
        self.lb.out(id);
    }

    fn events(&self) -> u32 {
        if self.lb.can_send() {
            EVENT_OUT
        } else {
            0
        }
    }

    fn send(&mut self, msg: Bytes) -> Result<()> {
        self.lb.send(msg).map(|_| ())
    }

    fn recv(&mut self) -> Result<Bytes> {
        Err(SpindleError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::inproc;
    use spindle_core::options::PipeOptions;
    use spindle_core::pipe::Pipe;
    use std::sync::Arc;

    #[test]
    fn test_push_prefers_higher_priority_peer() {
        let mut push = XPush::new();
        let (low, low_peer) = inproc::pair(
            PipeOptions::default().with_send_priority(9),
            PipeOptions::default(),
            8,
        );
        let (high, high_peer) = inproc::pair(
            PipeOptions::default().with_send_priority(2),
            PipeOptions::default(),
            8,
        );
        let (low_id, high_id) = (low.id(), high.id());
        push.add(Arc::new(low)).unwrap();
        push.add(Arc::new(high)).unwrap();
        push.pipe_out(low_id);
        push.pipe_out(high_id);

        for _ in 0..3 {
            push.send(Bytes::from_static(b"job")).unwrap();
        }
        assert_eq!(high_peer.pending(), 3);
        assert_eq!(low_peer.pending(), 0);
    }

    #[test]
    fn test_recv_is_not_supported() {
        let mut push = XPush::new();
        assert!(matches!(push.recv(), Err(SpindleError::NotSupported)));
    }
}
