//! # Spindle SP
//!
//! Scalability-protocol socket patterns and connection lifecycle on top of
//! the `spindle-core` state machine kernel.
//!
//! ## Overview
//!
//! A [`Socket`] is a root state machine owning one pattern:
//! - **PAIR**: one peer, both directions ([`xpair`])
//! - **PUB** / **SUB**: broadcast and prefix-filtered receive ([`xpub`], [`xsub`])
//! - **REQ**: load-balanced requests, fair-queued replies ([`xreq`])
//! - **PUSH** / **PULL**: load-balanced pipeline ([`xpush`], [`xpull`])
//!
//! Connections reach the socket through the machines in [`transport`]: a
//! listener per bound endpoint, an acceptor per connection and a session per
//! established stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spindle_core::worker::{PoolConfig, WorkerPool};
//! use spindle_sp::socket::{Socket, SocketConfig};
//! use spindle_sp::transport::inproc;
//! use spindle_sp::SocketType;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(PoolConfig::default())?;
//! let push = Socket::open(pool.context(), SocketConfig::new(SocketType::Push))?;
//! let pull = Socket::open(pool.context(), SocketConfig::new(SocketType::Pull))?;
//! inproc::connect(&push, &pull, Default::default(), 16)?;
//!
//! // Readiness arrives asynchronously; `send` returns `Again` until then.
//! push.send("job")?;
//! let job = pull.recv()?;
//! # Ok(())
//! # }
//! ```

// Allow some pedantic lints
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![deny(unsafe_code)]

pub mod pattern;
pub mod socket;
pub mod socket_type;
pub mod transport;

// Socket patterns
pub mod xpair;
pub mod xpub;
pub mod xpull;
pub mod xpush;
pub mod xreq;
pub mod xsub;

pub use pattern::{SocketOption, SocketPattern, EVENT_IN, EVENT_OUT};
pub use socket::{EndpointId, Socket, SocketConfig, Termination};
pub use socket_type::SocketType;

/// Convenient imports for socket users.
pub mod prelude {
    pub use crate::pattern::{SocketOption, EVENT_IN, EVENT_OUT};
    pub use crate::socket::{EndpointId, Socket, SocketConfig, Termination};
    pub use crate::socket_type::SocketType;
    pub use crate::transport::{RawListener, RawStream};
    pub use bytes::Bytes;
}
