//! Fair queue: receives round-robin from the pipes of the best receive priority.

use crate::error::{Result, SpindleError};
use crate::pipe::{PipeId, PipeRef};
use crate::priolist::PriorityList;
use bytes::Bytes;
use tracing::trace;

/// Inbound collection over a [`PriorityList`] keyed by receive priority.
#[derive(Debug, Default)]
pub struct FairQueue {
    pipes: PriorityList<PipeRef>,
}

impl FairQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipe. It takes part once it is announced with [`pipe_in`](Self::pipe_in).
    pub fn add(&mut self, pipe: PipeRef) {
        let priority = pipe.options().recv_priority;
        self.pipes.add(pipe.id(), pipe, priority);
    }

    pub fn remove(&mut self, id: PipeId) {
        self.pipes.remove(id);
    }

    /// The pipe has messages to receive again.
    pub fn pipe_in(&mut self, id: PipeId) {
        self.pipes.activate(id);
    }

    #[must_use]
    pub fn can_recv(&self) -> bool {
        self.pipes.is_active()
    }

    /// Receives from the current pipe and rotates. Returns the message and the
    /// pipe it came from.
    ///
    /// Fails with [`SpindleError::Again`] when no pipe is active.
    pub fn recv(&mut self) -> Result<(Bytes, PipeId)> {
        let Some((id, pipe)) = self.pipes.current() else {
            return Err(SpindleError::Again);
        };
        match pipe.recv() {
            Ok((msg, status)) => {
                trace!(pipe = id, len = msg.len(), ?status, "[FQ] received");
                self.pipes.advance(status.is_release());
                Ok((msg, id))
            }
            Err(e) => {
                trace!(pipe = id, error = %e, "[FQ] pipe had nothing to deliver");
                self.pipes.advance(true);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc::{self, InprocPipe};
    use crate::options::PipeOptions;
    use crate::pipe::Pipe;
    use std::sync::Arc;

    fn pipe(prio: u8) -> (PipeRef, InprocPipe) {
        let (ours, theirs) = inproc::pair(
            PipeOptions::default().with_recv_priority(prio),
            PipeOptions::default(),
            16,
        );
        (Arc::new(ours), theirs)
    }

    #[test]
    fn round_robin_between_equal_priorities() {
        let mut fq = FairQueue::new();
        let (a, a_peer) = pipe(8);
        let (b, b_peer) = pipe(8);
        let (a_id, b_id) = (a.id(), b.id());
        for i in 0..2u8 {
            a_peer.send(Bytes::from(vec![b'a', i])).unwrap();
            b_peer.send(Bytes::from(vec![b'b', i])).unwrap();
        }
        fq.add(a);
        fq.add(b);
        fq.pipe_in(a_id);
        fq.pipe_in(b_id);

        let order: Vec<_> = (0..4).map(|_| fq.recv().unwrap().1).collect();
        assert_eq!(order, vec![a_id, b_id, a_id, b_id]);
        assert!(!fq.can_recv());
        assert!(fq.recv().unwrap_err().is_again());
    }

    #[test]
    fn drains_higher_priority_first() {
        let mut fq = FairQueue::new();
        let (low, low_peer) = pipe(9);
        let (high, high_peer) = pipe(2);
        let (low_id, high_id) = (low.id(), high.id());
        low_peer.send(Bytes::from_static(b"low")).unwrap();
        high_peer.send(Bytes::from_static(b"high-1")).unwrap();
        high_peer.send(Bytes::from_static(b"high-2")).unwrap();
        fq.add(low);
        fq.add(high);
        fq.pipe_in(low_id);
        fq.pipe_in(high_id);

        assert_eq!(fq.recv().unwrap(), (Bytes::from_static(b"high-1"), high_id));
        assert_eq!(fq.recv().unwrap(), (Bytes::from_static(b"high-2"), high_id));
        assert_eq!(fq.recv().unwrap(), (Bytes::from_static(b"low"), low_id));
    }
}
