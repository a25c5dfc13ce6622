//! In-process transport: connects two sockets with an inproc pipe pair.
//!
//! Readiness is relayed through the socket context's worker, so a send on one
//! socket never enters the peer's context on the sending thread.

use super::{RawStream, CLOSED, ESTABLISHED, READABLE, WRITABLE};
use crate::socket::{EndpointId, Socket};
use spindle_core::context::FsmHandle;
use spindle_core::error::{Result, SpindleError};
use spindle_core::inproc::{self, InprocPipe, Wake, Waker};
use spindle_core::options::PipeOptions;
use spindle_core::pipe::PipeRef;
use spindle_core::worker::Worker;
use std::sync::Arc;
use tracing::{debug, trace};

/// [`RawStream`] over one end of an in-process pipe pair.
pub struct InprocStream {
    pipe: Arc<InprocPipe>,
    worker: Worker,
}

impl InprocStream {
    #[must_use]
    pub fn new(pipe: InprocPipe, worker: Worker) -> Self {
        Self {
            pipe: Arc::new(pipe),
            worker,
        }
    }
}

impl RawStream for InprocStream {
    fn start(&mut self, notify: FsmHandle) {
        // Queued before the waker can fire, so the session sees the handshake
        // complete before any readiness.
        let _ = self.worker.post(notify.clone(), ESTABLISHED);
        let worker = self.worker.clone();
        let waker: Waker = Arc::new(move |pipe, wake| {
            let kind = match wake {
                Wake::In => READABLE,
                Wake::Out => WRITABLE,
            };
            trace!(pipe, kind, "[INPROC] relaying readiness");
            let _ = worker.post(notify.clone(), kind);
        });
        self.pipe.set_waker(waker);
    }

    fn pipe(&self) -> PipeRef {
        Arc::clone(&self.pipe) as PipeRef
    }

    fn cancel(&mut self) {
        self.pipe.clear_waker();
    }

    fn close(&mut self, notify: FsmHandle) {
        self.pipe.clear_waker();
        let _ = self.worker.post(notify, CLOSED);
    }
}

/// Connects `a` and `b` with a pipe pair buffering `capacity` messages in
/// each direction.
///
/// Fails with [`SpindleError::NotSupported`] if the socket types cannot talk
/// to each other, or if either socket does not live in a worker-driven
/// context.
pub fn connect(
    a: &Socket,
    b: &Socket,
    options: (PipeOptions, PipeOptions),
    capacity: usize,
) -> Result<(EndpointId, EndpointId)> {
    if !a.socket_type().is_compatible(b.socket_type()) {
        debug!(a = %a.socket_type(), b = %b.socket_type(), "[INPROC] incompatible socket types");
        return Err(SpindleError::NotSupported);
    }
    let a_worker = a.context().worker().cloned().ok_or(SpindleError::NotSupported)?;
    let b_worker = b.context().worker().cloned().ok_or(SpindleError::NotSupported)?;
    let (a_pipe, b_pipe) = inproc::pair(options.0, options.1, capacity);
    debug!(a = %a.socket_type(), b = %b.socket_type(), capacity, "[INPROC] connecting sockets");

    let a_end = a.attach(Box::new(InprocStream::new(a_pipe, a_worker)))?;
    let b_end = b.attach(Box::new(InprocStream::new(b_pipe, b_worker)))?;
    Ok((a_end, b_end))
}
