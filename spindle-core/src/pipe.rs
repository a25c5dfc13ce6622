//! Pipe boundary between socket patterns and transports.
//!
//! A pipe is one connection's message channel as seen by a socket. Its
//! send/recv report, together with the message, whether the pipe can take
//! another operation right away ([`PipeStatus::Ok`]) or has gone quiet until
//! the transport signals readiness again ([`PipeStatus::Release`]).

use crate::error::Result;
use crate::options::PipeOptions;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a pipe, unique within the process.
pub type PipeId = u64;

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh process-unique [`PipeId`].
#[must_use]
pub fn next_pipe_id() -> PipeId {
    NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of a successful pipe operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    /// The pipe can take another operation of the same kind.
    Ok,
    /// The pipe has no more capacity (send) or data (recv) for now; it will
    /// be re-announced through `in`/`out` once it does.
    Release,
}

impl PipeStatus {
    #[inline]
    #[must_use]
    pub const fn is_release(self) -> bool {
        matches!(self, Self::Release)
    }
}

/// One connection's message channel.
pub trait Pipe: Send + Sync {
    fn id(&self) -> PipeId;

    fn options(&self) -> PipeOptions;

    /// Sends one message. Fails with `Again` if the pipe cannot accept it.
    fn send(&self, msg: Bytes) -> Result<PipeStatus>;

    /// Receives one message. Fails with `Again` if none is available.
    fn recv(&self) -> Result<(Bytes, PipeStatus)>;
}

/// Shared handle to a pipe.
pub type PipeRef = Arc<dyn Pipe>;
