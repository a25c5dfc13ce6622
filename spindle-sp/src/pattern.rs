//! Socket pattern glue: the per-type policy between a socket and its pipes.
//!
//! A socket root forwards every pipe lifecycle event to its pattern and routes
//! application `send`/`recv` through it. Patterns only ever see pipes and
//! messages; connection management lives in [`transport`](crate::transport).

use crate::socket_type::SocketType;
use crate::{xpair, xpub, xpull, xpush, xreq, xsub};
use bytes::Bytes;
use spindle_core::error::{Result, SpindleError};
use spindle_core::pipe::{PipeId, PipeRef};

/// `events()` bit: a `recv` would succeed.
pub const EVENT_IN: u32 = 1;
/// `events()` bit: a `send` would succeed.
pub const EVENT_OUT: u32 = 2;

/// Pattern-specific socket options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// Accept messages starting with the given prefix.
    Subscribe(Bytes),
    /// Drop a subscription added with [`SocketOption::Subscribe`].
    Unsubscribe(Bytes),
}

/// Per-type message distribution policy.
///
/// Pipe lifecycle calls (`add`, `remove`, `pipe_in`, `pipe_out`) follow the
/// pipe protocol: a pipe is added once, announced `in`/`out` only after it was
/// released in that direction, and removed once.
pub trait SocketPattern: Send + 'static {
    fn socket_type(&self) -> SocketType;

    /// Attaches a new pipe. Priorities are read from its options here and
    /// stay fixed for the pipe's lifetime.
    fn add(&mut self, pipe: PipeRef) -> Result<()>;

    fn remove(&mut self, id: PipeId);

    /// The pipe has messages to receive again.
    fn pipe_in(&mut self, id: PipeId);

    /// The pipe can accept messages again.
    fn pipe_out(&mut self, id: PipeId);

    /// Bitmask of [`EVENT_IN`] and [`EVENT_OUT`].
    fn events(&self) -> u32;

    fn send(&mut self, msg: Bytes) -> Result<()>;

    fn recv(&mut self) -> Result<Bytes>;

    fn set_option(&mut self, option: SocketOption) -> Result<()> {
        let _ = option;
        Err(SpindleError::NotSupported)
    }
}

/// Instantiates the raw pattern behind `socket_type`.
///
/// REP sockets need reply routing, which the raw patterns do not provide, so
/// they fail with [`SpindleError::NotSupported`].
pub fn create(socket_type: SocketType) -> Result<Box<dyn SocketPattern>> {
    let pattern: Box<dyn SocketPattern> = match socket_type {
        SocketType::Pair => Box::new(xpair::XPair::new()),
        SocketType::Pub => Box::new(xpub::XPub::new()),
        SocketType::Sub => Box::new(xsub::XSub::new()),
        SocketType::Req => Box::new(xreq::XReq::new()),
        SocketType::Push => Box::new(xpush::XPush::new()),
        SocketType::Pull => Box::new(xpull::XPull::new()),
        SocketType::Rep => return Err(SpindleError::NotSupported),
    };
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_matches_type() {
        for ty in [
            SocketType::Pair,
            SocketType::Pub,
            SocketType::Sub,
            SocketType::Req,
            SocketType::Push,
            SocketType::Pull,
        ] {
            let pattern = create(ty).unwrap();
            assert_eq!(pattern.socket_type(), ty);
            // A publisher can always send; messages without readers are dropped.
            let expected = if ty == SocketType::Pub { EVENT_OUT } else { 0 };
            assert_eq!(pattern.events(), expected);
        }
        assert!(matches!(
            create(SocketType::Rep),
            Err(SpindleError::NotSupported)
        ));
    }

    #[test]
    fn test_options_unsupported_by_default() {
        let mut push = create(SocketType::Push).unwrap();
        let err = push
            .set_option(SocketOption::Subscribe(Bytes::from_static(b"a")))
            .unwrap_err();
        assert!(matches!(err, SpindleError::NotSupported));
    }
}
