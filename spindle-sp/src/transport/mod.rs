//! Connection lifecycle: listeners, per-connection acceptors and sessions.
//!
//! Raw I/O is supplied by the transport through [`RawListener`] and
//! [`RawStream`]. Both report completions by posting an event through the
//! [`FsmHandle`] they were given. The machine tree for one bound endpoint is:
//!
//! ```text
//! socket ─┬─ listener ─┬─ acceptor (pending)        ── session
//!         │            └─ acceptor (connection) ×N  ── session
//!         └─ session (attached stream)
//! ```
//!
//! # Transport contract
//!
//! - Completions are posted asynchronously, never from inside the call that
//!   requested them: the caller holds the context lock.
//! - A stream's pipe is dormant in both directions until the stream posts
//!   [`WRITABLE`] or [`READABLE`]. After that, each direction is posted again
//!   only once the pipe has reported `Release` in it.
//! - After `cancel`/`cancel_accept` no further completions should be posted;
//!   completions already in flight are tolerated and ignored.

mod acceptor;
pub mod inproc;
mod listener;
mod session;

pub(crate) use acceptor::Acceptor;
pub(crate) use listener::Listener;
pub(crate) use session::{Session, SRC_SOCKET};

use spindle_core::context::FsmHandle;
use spindle_core::event::{EventType, Src};
use spindle_core::pipe::PipeRef;

/// Listener: an accept finished; [`RawListener::take_accepted`] has the stream.
pub const ACCEPTED: EventType = 1;
/// Listener: an accept failed. The listener stays usable.
pub const ACCEPT_ERROR: EventType = 2;
/// Stream: the connection handshake finished and the pipe is usable.
pub const ESTABLISHED: EventType = 3;
/// Stream: the pipe has messages to receive again.
pub const READABLE: EventType = 4;
/// Stream: the pipe can take messages again.
pub const WRITABLE: EventType = 5;
/// Stream: the connection failed.
pub const ERROR: EventType = 6;
/// Listener or stream: `close` finished.
pub const CLOSED: EventType = 7;

/// Raised by a machine that finished shutting down.
pub const STOPPED: EventType = 10;
/// Pipe events raised by sessions at the socket root.
pub const PIPE_ATTACHED: EventType = 11;
pub const PIPE_IN: EventType = 12;
pub const PIPE_OUT: EventType = 13;
pub const PIPE_DETACHED: EventType = 14;
/// Raised by the socket root at a session whose pipe it refused.
pub const REJECTED: EventType = 15;

/// Source stamp of pipe events delivered to the socket root.
pub const SRC_PIPE: Src = 100;

/// Listening side of a transport.
pub trait RawListener: Send + 'static {
    /// Starts accepting one connection. Posts [`ACCEPTED`] or
    /// [`ACCEPT_ERROR`] to `notify`.
    fn accept(&mut self, notify: FsmHandle);

    /// Hands over the stream produced by the last [`ACCEPTED`] completion.
    fn take_accepted(&mut self) -> Option<Box<dyn RawStream>>;

    /// Abandons a pending accept.
    fn cancel_accept(&mut self);

    /// Stops listening. Posts [`CLOSED`] to `notify`.
    fn close(&mut self, notify: FsmHandle);
}

/// One connected byte stream together with the pipe framing it.
pub trait RawStream: Send + 'static {
    /// Starts the connection handshake. Posts [`ESTABLISHED`], then
    /// [`READABLE`] and [`WRITABLE`] as the pipe becomes ready, or [`ERROR`].
    fn start(&mut self, notify: FsmHandle);

    /// The pipe carrying this stream's messages.
    fn pipe(&self) -> PipeRef;

    /// Stops posting completions.
    fn cancel(&mut self);

    /// Closes the stream. Posts [`CLOSED`] to `notify`.
    fn close(&mut self, notify: FsmHandle);
}
