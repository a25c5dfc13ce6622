//! # Spindle
//!
//! Asynchronous socket core for scalability-protocol messaging.
//!
//! Spindle is organised in two layers:
//!
//! - **Kernel** (always available): contexts, state machines and events;
//!   worker threads; pipes and their scheduling policies (priority lists,
//!   load balancing, fair queueing, exclusive and distributed delivery); the
//!   subscription trie.
//! - **Sockets** (feature `sp`): PAIR, PUB/SUB, REQ and PUSH/PULL patterns
//!   behind a socket root state machine, plus the listener, acceptor and
//!   session machines that manage connections.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! spindle = { version = "0.1", features = ["sp"] }
//! ```
//!
//! ```rust,ignore
//! use spindle::prelude::*;
//! use spindle::sp::inproc;
//!
//! let pool = WorkerPool::new(PoolConfig::default())?;
//! let push = Socket::open(pool.context(), SocketConfig::new(SocketType::Push))?;
//! let pull = Socket::open(pool.context(), SocketConfig::new(SocketType::Pull))?;
//! inproc::connect(&push, &pull, Default::default(), 64)?;
//! ```
//!
//! ## Concurrency
//!
//! Every socket lives in a [`Context`](context::Context), a single mutual
//! exclusion domain. Events raised inside a context are drained before its
//! lock is released; events for other contexts are delivered only after that.
//! Transport completions enter a context from outside, typically from a
//! worker thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;
pub use spindle_core::error::{Result, SpindleError};

// Kernel modules
pub use spindle_core::{
    context, dist, error, event, excl, fq, fsm, inproc, lb, options, pipe, priolist, stats, trie,
    worker,
};

// Socket layer (opt-in via features)
#[cfg(feature = "sp")]
pub mod sp;

pub mod dev_tracing;

/// Convenient imports for common use cases.
pub mod prelude {
    pub use bytes::Bytes;
    pub use spindle_core::prelude::*;

    #[cfg(feature = "sp")]
    pub use crate::sp::{
        EndpointId, Socket, SocketConfig, SocketOption, SocketType, Termination, EVENT_IN,
        EVENT_OUT,
    };
}
