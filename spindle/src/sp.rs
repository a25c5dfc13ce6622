//! Scalability-protocol sockets.
//!
//! # Socket Types
//!
//! - PAIR - one peer, both directions
//! - PUB / SUB - broadcast and prefix-filtered receive
//! - REQ - load-balanced requests, fair-queued replies
//! - PUSH / PULL - load-balanced pipeline
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use spindle::sp::{inproc, Socket, SocketConfig, SocketType};
//! use spindle::worker::{PoolConfig, WorkerPool};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(PoolConfig::default().with_threads(2))?;
//! let publisher = Socket::open(pool.context(), SocketConfig::new(SocketType::Pub))?;
//! let subscriber = Socket::open(pool.context(), SocketConfig::new(SocketType::Sub))?;
//! subscriber.subscribe(b"weather.")?;
//! inproc::connect(&publisher, &subscriber, Default::default(), 64)?;
//!
//! publisher.send("weather.rain")?;
//! # Ok(())
//! # }
//! ```

pub use spindle_sp::pattern::{SocketOption, SocketPattern, EVENT_IN, EVENT_OUT};
pub use spindle_sp::socket::{EndpointId, Socket, SocketConfig, Termination};
pub use spindle_sp::socket_type::SocketType;
pub use spindle_sp::transport::{self, inproc, RawListener, RawStream};
pub use spindle_sp::{xpair, xpub, xpull, xpush, xreq, xsub};
