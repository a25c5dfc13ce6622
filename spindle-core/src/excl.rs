//! Exclusive pipe holder for one-peer patterns.

use crate::error::{Result, SpindleError};
use crate::pipe::{PipeId, PipeRef};
use bytes::Bytes;
use tracing::debug;

/// Holds at most one pipe and tracks its readiness in both directions.
#[derive(Default)]
pub struct Exclusive {
    pipe: Option<PipeRef>,
    readable: bool,
    writable: bool,
}

impl std::fmt::Debug for Exclusive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exclusive")
            .field("pipe", &self.pipe.as_ref().map(|p| p.id()))
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}

impl Exclusive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes `pipe` as the peer.
    ///
    /// Fails with [`SpindleError::AlreadyConnected`] if a peer is held.
    pub fn add(&mut self, pipe: PipeRef) -> Result<()> {
        if let Some(held) = &self.pipe {
            debug!(held = held.id(), rejected = pipe.id(), "[EXCL] peer already connected");
            return Err(SpindleError::AlreadyConnected);
        }
        self.pipe = Some(pipe);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `id` is not the held pipe.
    #[track_caller]
    pub fn remove(&mut self, id: PipeId) {
        self.assert_held(id);
        self.pipe = None;
        self.readable = false;
        self.writable = false;
    }

    #[track_caller]
    pub fn pipe_in(&mut self, id: PipeId) {
        self.assert_held(id);
        assert!(!self.readable, "pipe {id} announced readable twice");
        self.readable = true;
    }

    #[track_caller]
    pub fn pipe_out(&mut self, id: PipeId) {
        self.assert_held(id);
        assert!(!self.writable, "pipe {id} announced writable twice");
        self.writable = true;
    }

    #[must_use]
    pub fn holds(&self, id: PipeId) -> bool {
        self.pipe.as_ref().is_some_and(|p| p.id() == id)
    }

    #[must_use]
    pub const fn can_send(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub const fn can_recv(&self) -> bool {
        self.readable
    }

    pub fn send(&mut self, msg: Bytes) -> Result<()> {
        let pipe = match &self.pipe {
            Some(pipe) if self.writable => pipe,
            _ => return Err(SpindleError::Again),
        };
        match pipe.send(msg) {
            Ok(status) => {
                self.writable = !status.is_release();
                Ok(())
            }
            Err(e) => {
                self.writable = false;
                Err(e)
            }
        }
    }

    pub fn recv(&mut self) -> Result<Bytes> {
        let pipe = match &self.pipe {
            Some(pipe) if self.readable => pipe,
            _ => return Err(SpindleError::Again),
        };
        match pipe.recv() {
            Ok((msg, status)) => {
                self.readable = !status.is_release();
                Ok(msg)
            }
            Err(e) => {
                self.readable = false;
                Err(e)
            }
        }
    }

    #[track_caller]
    fn assert_held(&self, id: PipeId) {
        assert!(self.holds(id), "pipe {id} is not the exclusive peer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc;
    use crate::options::PipeOptions;
    use crate::pipe::Pipe;
    use std::sync::Arc;

    #[test]
    fn second_peer_is_rejected() {
        let (a, _) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 1);
        let (b, _) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 1);
        let mut excl = Exclusive::new();
        excl.add(Arc::new(a)).unwrap();
        assert!(matches!(
            excl.add(Arc::new(b)),
            Err(SpindleError::AlreadyConnected)
        ));
    }

    #[test]
    fn readiness_follows_pipe_status() {
        let (a, peer) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 1);
        let id = a.id();
        let mut excl = Exclusive::new();
        excl.add(Arc::new(a)).unwrap();
        assert!(excl.send(Bytes::from_static(b"x")).unwrap_err().is_again());

        excl.pipe_out(id);
        excl.send(Bytes::from_static(b"ping")).unwrap();
        // Capacity 1: the pipe is full and released.
        assert!(!excl.can_send());

        peer.send(Bytes::from_static(b"pong")).unwrap();
        excl.pipe_in(id);
        assert_eq!(excl.recv().unwrap(), Bytes::from_static(b"pong"));
        assert!(!excl.can_recv());

        excl.remove(id);
        assert!(!excl.holds(id));
    }
}
