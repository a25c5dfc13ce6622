//! Raw subscriber pattern: fair-queued receives filtered by a subscription
//! trie.
//!
//! Filtering happens on the receiving side. Messages that match no
//! subscription are consumed and discarded inside `recv`, so the caller only
//! ever sees matching messages or `Again`.

use crate::pattern::{SocketOption, SocketPattern, EVENT_IN};
use crate::socket_type::SocketType;
use bytes::Bytes;
use spindle_core::error::{Result, SpindleError};
use spindle_core::fq::FairQueue;
use spindle_core::pipe::{PipeId, PipeRef};
use spindle_core::trie::SubscriptionTrie;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct XSub {
    fq: FairQueue,
    trie: SubscriptionTrie,
}

impl XSub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `topic` is a new subscription.
    pub fn subscribe(&mut self, topic: &[u8]) -> bool {
        let added = self.trie.subscribe(topic);
        debug!(topic_len = topic.len(), added, "[XSUB] subscribe");
        added
    }

    /// Fails with [`SpindleError::SubscriptionNotFound`] for unknown topics.
    pub fn unsubscribe(&mut self, topic: &[u8]) -> Result<bool> {
        let removed = self.trie.unsubscribe(topic)?;
        debug!(topic_len = topic.len(), removed, "[XSUB] unsubscribe");
        Ok(removed)
    }
}

impl SocketPattern for XSub {
    fn socket_type(&self) -> SocketType {
        SocketType::Sub
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
        loop {
            let (msg, pipe) = self.fq.recv()?;
            if self.trie.matches(&msg) {
                return Ok(msg);
            }
            trace!(pipe, len = msg.len(), "[XSUB] discarding unsubscribed message");
        }
    }

    fn set_option(&mut self, option: SocketOption) -> Result<()> {
        match option {
            SocketOption::Subscribe(topic) => {
                self.subscribe(&topic);
                Ok(())
            }
            SocketOption::Unsubscribe(topic) => self.unsubscribe(&topic).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::inproc::{self, InprocPipe};
    use spindle_core::options::PipeOptions;
    use spindle_core::pipe::Pipe;
    use std::sync::Arc;

    fn attached(sub: &mut XSub) -> (PipeId, InprocPipe) {
        let (ours, theirs) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 16);
        let id = ours.id();
        sub.add(Arc::new(ours)).unwrap();
        (id, theirs)
    }

    fn publish(peer: &InprocPipe, msgs: &[&'static str]) {
        for msg in msgs {
            peer.send(Bytes::from_static(msg.as_bytes())).unwrap();
        }
    }

    #[test]
    fn test_recv_discards_until_match() {
        let mut sub = XSub::new();
        sub.set_option(SocketOption::Subscribe(Bytes::from_static(b"weather.")))
            .unwrap();
        let (id, peer) = attached(&mut sub);

        publish(&peer, &["sports.goal", "news.x", "weather.rain", "sports.end"]);
        sub.pipe_in(id);

        assert_eq!(sub.recv().unwrap(), "weather.rain");
        // The trailing message does not match and the pipe drains.
        assert!(sub.recv().unwrap_err().is_again());
        assert_eq!(peer.pending(), 0);
        assert_eq!(sub.events(), 0);
    }

    #[test]
    fn test_nothing_matches_without_subscriptions() {
        let mut sub = XSub::new();
        let (id, peer) = attached(&mut sub);
        publish(&peer, &["a", "b"]);
        sub.pipe_in(id);
        assert!(sub.recv().unwrap_err().is_again());
    }

    #[test]
    fn test_empty_subscription_matches_everything() {
        let mut sub = XSub::new();
        assert!(sub.subscribe(b""));
        let (id, peer) = attached(&mut sub);
        publish(&peer, &["anything"]);
        sub.pipe_in(id);
        assert_eq!(sub.recv().unwrap(), "anything");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut sub = XSub::new();
        sub.subscribe(b"t");
        sub.subscribe(b"t");
        assert!(!sub.unsubscribe(b"t").unwrap());
        assert!(sub.unsubscribe(b"t").unwrap());
        assert!(matches!(
            sub.set_option(SocketOption::Unsubscribe(Bytes::from_static(b"t"))),
            Err(SpindleError::SubscriptionNotFound)
        ));

        let (id, peer) = attached(&mut sub);
        publish(&peer, &["topic"]);
        sub.pipe_in(id);
        assert!(sub.recv().unwrap_err().is_again());
    }
}
