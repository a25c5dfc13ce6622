/// Spindle Error Types
///
/// Expected operational conditions of the messaging core. Broken state-machine
/// protocol invariants are not represented here: they panic (see `fsm::bad_state`).

use std::io;
use thiserror::Error;

/// Main error type for Spindle operations
#[derive(Error, Debug)]
pub enum SpindleError {
    /// No pipe is currently able to send or receive (EAGAIN)
    #[error("Resource temporarily unavailable")]
    Again,

    /// An exclusive socket already holds a peer (EISCONN)
    #[error("Peer already connected")]
    AlreadyConnected,

    /// Unsubscribe of a topic that has no subscription
    #[error("Subscription not found")]
    SubscriptionNotFound,

    /// The socket pattern does not support this operation
    #[error("Operation not supported by this socket type")]
    NotSupported,

    /// The socket or endpoint is shutting down
    #[error("Socket terminated")]
    Terminated,

    /// The endpoint id does not name a live endpoint
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(u64),

    /// IO error reported by a transport collaborator
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for Spindle operations
pub type Result<T> = std::result::Result<T, SpindleError>;

impl SpindleError {
    /// Check if this is the "try again later" condition
    #[must_use]
    pub const fn is_again(&self) -> bool {
        matches!(self, Self::Again)
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable conditions are retried once the next readiness event arrives.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Again => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::AlreadyConnected
            | Self::SubscriptionNotFound
            | Self::NotSupported
            | Self::Terminated
            | Self::UnknownEndpoint(_) => false,
        }
    }
}

impl From<SpindleError> for io::Error {
    fn from(err: SpindleError) -> Self {
        let kind = match err {
            SpindleError::Io(e) => return e,
            SpindleError::Again => io::ErrorKind::WouldBlock,
            SpindleError::AlreadyConnected => io::ErrorKind::AlreadyExists,
            SpindleError::SubscriptionNotFound | SpindleError::UnknownEndpoint(_) => {
                io::ErrorKind::NotFound
            }
            SpindleError::NotSupported => io::ErrorKind::Unsupported,
            SpindleError::Terminated => io::ErrorKind::NotConnected,
        };
        io::Error::new(kind, err)
    }
}
