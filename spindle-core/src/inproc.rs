//! In-process pipes for connecting sockets within the same process.
//!
//! [`pair`] returns two connected [`InprocPipe`]s backed by bounded flume
//! channels. Each end implements [`Pipe`], so it can be attached to any socket
//! pattern directly.
//!
//! # Readiness
//!
//! An operation that leaves the pipe without data (recv) or capacity (send)
//! reports [`PipeStatus::Release`]. The end then stays quiet until the waker
//! installed with [`InprocPipe::set_waker`] is called with [`Wake::In`] or
//! [`Wake::Out`]. Each release is matched by exactly one wake, which is what
//! the priority lists expect.
//!
//! ```rust
//! use spindle_core::inproc;
//! use spindle_core::options::PipeOptions;
//! use spindle_core::pipe::{Pipe, PipeStatus};
//! use bytes::Bytes;
//!
//! let (a, b) = inproc::pair(PipeOptions::default(), PipeOptions::default(), 4);
//! a.send(Bytes::from_static(b"hello")).unwrap();
//! let (msg, status) = b.recv().unwrap();
//! assert_eq!(msg, "hello");
//! assert_eq!(status, PipeStatus::Release);
//! ```

use crate::error::{Result, SpindleError};
use crate::options::PipeOptions;
use crate::pipe::{next_pipe_id, Pipe, PipeId, PipeStatus};
use bytes::Bytes;
use flume::{Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Readiness edge delivered to a waker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The pipe has a message to receive again.
    In,
    /// The pipe can accept a message again.
    Out,
}

/// Callback invoked with the id of the woken pipe.
///
/// Runs on the thread performing the peer's operation, possibly while that
/// peer's context is entered, so it must hand the notification off (e.g. to a
/// worker) rather than enter a context itself.
pub type Waker = Arc<dyn Fn(PipeId, Wake) + Send + Sync>;

struct End {
    id: PipeId,
    awaiting_in: AtomicBool,
    awaiting_out: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl End {
    fn new(id: PipeId) -> Self {
        Self {
            id,
            awaiting_in: AtomicBool::new(true),
            awaiting_out: AtomicBool::new(true),
            waker: RwLock::new(None),
        }
    }

    fn flag(&self, wake: Wake) -> &AtomicBool {
        match wake {
            Wake::In => &self.awaiting_in,
            Wake::Out => &self.awaiting_out,
        }
    }

    /// Fires `wake` if this end is waiting for it and has a waker.
    fn wake(&self, wake: Wake) {
        let waker = self.waker.read();
        if let Some(waker) = waker.as_ref() {
            if self.flag(wake).swap(false, Ordering::AcqRel) {
                trace!(pipe = self.id, ?wake, "[INPROC] wake");
                waker(self.id, wake);
            }
        }
    }
}

struct Shared {
    ends: [End; 2],
}

/// One end of an in-process pipe pair.
pub struct InprocPipe {
    side: usize,
    options: PipeOptions,
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    shared: Arc<Shared>,
}

/// Creates a connected pair of pipes. Each direction buffers up to
/// `capacity` messages.
#[must_use]
pub fn pair(a: PipeOptions, b: PipeOptions, capacity: usize) -> (InprocPipe, InprocPipe) {
    let capacity = capacity.max(1);
    let (a_tx, b_rx) = flume::bounded(capacity);
    let (b_tx, a_rx) = flume::bounded(capacity);
    let shared = Arc::new(Shared {
        ends: [End::new(next_pipe_id()), End::new(next_pipe_id())],
    });

    let a = InprocPipe {
        side: 0,
        options: a,
        tx: a_tx,
        rx: a_rx,
        shared: Arc::clone(&shared),
    };
    let b = InprocPipe {
        side: 1,
        options: b,
        tx: b_tx,
        rx: b_rx,
        shared,
    };
    (a, b)
}

impl InprocPipe {
    fn this(&self) -> &End {
        &self.shared.ends[self.side]
    }

    fn peer(&self) -> &End {
        &self.shared.ends[1 - self.side]
    }

    /// Installs the readiness callback for this end.
    ///
    /// Both directions start out waiting, so installing a waker immediately
    /// announces `Out` when there is capacity and `In` when messages are
    /// already buffered.
    pub fn set_waker(&self, waker: Waker) {
        *self.this().waker.write() = Some(waker);
        if !self.tx.is_full() {
            self.this().wake(Wake::Out);
        }
        if !self.rx.is_empty() {
            self.this().wake(Wake::In);
        }
    }

    /// Removes the readiness callback. Releases that happen afterwards are
    /// still tracked, so a later [`set_waker`](Self::set_waker) catches up.
    pub fn clear_waker(&self) {
        self.this().waker.write().take();
    }

    /// Number of messages waiting to be received on this end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl std::fmt::Debug for InprocPipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InprocPipe")
            .field("id", &self.id())
            .field("peer", &self.peer().id)
            .field("options", &self.options)
            .finish()
    }
}

impl Pipe for InprocPipe {
    fn id(&self) -> PipeId {
        self.this().id
    }

    fn options(&self) -> PipeOptions {
        self.options
    }

    fn send(&self, msg: Bytes) -> Result<PipeStatus> {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(SpindleError::Again),
            Err(TrySendError::Disconnected(_)) => return Err(SpindleError::Terminated),
        }
        self.peer().wake(Wake::In);

        if !self.tx.is_full() {
            return Ok(PipeStatus::Ok);
        }
        let this = self.this();
        this.awaiting_out.store(true, Ordering::Release);
        // The peer may have drained the channel before the flag was visible.
        if !self.tx.is_full() && this.awaiting_out.swap(false, Ordering::AcqRel) {
            return Ok(PipeStatus::Ok);
        }
        Ok(PipeStatus::Release)
    }

    fn recv(&self) -> Result<(Bytes, PipeStatus)> {
        let msg = match self.rx.try_recv() {
            Ok(msg) => msg,
            Err(TryRecvError::Empty) => return Err(SpindleError::Again),
            Err(TryRecvError::Disconnected) => return Err(SpindleError::Terminated),
        };
        self.peer().wake(Wake::Out);

        if !self.rx.is_empty() {
            return Ok((msg, PipeStatus::Ok));
        }
        let this = self.this();
        this.awaiting_in.store(true, Ordering::Release);
        if !self.rx.is_empty() && this.awaiting_in.swap(false, Ordering::AcqRel) {
            return Ok((msg, PipeStatus::Ok));
        }
        Ok((msg, PipeStatus::Release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(pipe: &InprocPipe) -> Arc<Mutex<Vec<Wake>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pipe.set_waker(Arc::new(move |_, wake| sink.lock().push(wake)));
        seen
    }

    #[test]
    fn test_pair_ids_are_distinct() {
        let (a, b) = pair(PipeOptions::default(), PipeOptions::default(), 1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_send_recv() {
        let (a, b) = pair(PipeOptions::default(), PipeOptions::default(), 2);
        assert_eq!(a.send(Bytes::from_static(b"one")).unwrap(), PipeStatus::Ok);
        assert_eq!(a.send(Bytes::from_static(b"two")).unwrap(), PipeStatus::Release);
        assert!(a.send(Bytes::from_static(b"three")).unwrap_err().is_again());

        assert_eq!(b.recv().unwrap(), (Bytes::from_static(b"one"), PipeStatus::Ok));
        assert_eq!(
            b.recv().unwrap(),
            (Bytes::from_static(b"two"), PipeStatus::Release)
        );
        assert!(b.recv().unwrap_err().is_again());
    }

    #[test]
    fn test_waker_announces_initial_capacity() {
        let (a, _b) = pair(PipeOptions::default(), PipeOptions::default(), 1);
        let seen = recorder(&a);
        assert_eq!(*seen.lock(), vec![Wake::Out]);
    }

    #[test]
    fn test_release_is_matched_by_one_wake() {
        let (a, b) = pair(PipeOptions::default(), PipeOptions::default(), 1);
        let a_seen = recorder(&a);
        let b_seen = recorder(&b);
        a_seen.lock().clear();
        b_seen.lock().clear();

        // Fills the channel: a is released for out, b is woken for in.
        assert_eq!(a.send(Bytes::from_static(b"x")).unwrap(), PipeStatus::Release);
        assert_eq!(*b_seen.lock(), vec![Wake::In]);

        // Draining wakes a for out exactly once.
        assert_eq!(b.recv().unwrap().1, PipeStatus::Release);
        assert_eq!(*a_seen.lock(), vec![Wake::Out]);

        // Sending again wakes b for in again since it was released.
        a.send(Bytes::from_static(b"y")).unwrap();
        assert_eq!(*b_seen.lock(), vec![Wake::In, Wake::In]);
    }

    #[test]
    fn test_dropped_peer_terminates() {
        let (a, b) = pair(PipeOptions::default(), PipeOptions::default(), 1);
        drop(b);
        assert!(matches!(
            a.send(Bytes::from_static(b"x")),
            Err(SpindleError::Terminated)
        ));
        assert!(matches!(a.recv(), Err(SpindleError::Terminated)));
    }
}
