//! Spindle Core
//!
//! This crate contains the transport-agnostic kernel of the messaging stack:
//! - Arena and intrusive queue storage (`arena`, `queue`)
//! - Event & context kernel with the state machine primitive (`event`,
//!   `context`, `fsm`)
//! - Worker threads for deferred completions (`worker`)
//! - Pipe boundary, options and in-process pipes (`pipe`, `options`, `inproc`)
//! - Priority list and the pipe distribution algorithms (`priolist`, `lb`,
//!   `fq`, `excl`, `dist`)
//! - Subscription trie (`trie`)
//! - Connection statistics (`stats`)
//! - Error types (`error`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
pub mod arena;
pub mod context;
pub mod dist;
pub mod error;
pub mod event;
pub mod excl;
pub mod fq;
pub mod fsm;
pub mod inproc;
pub mod lb;
pub mod options;
pub mod pipe;
pub mod priolist;
pub mod queue;
pub mod stats;
pub mod trie;
pub mod worker;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::context::{Context, Entered, FsmCx, FsmHandle};
    pub use crate::error::{Result, SpindleError};
    pub use crate::event::{EventId, EventType, FsmEvent, FsmId, Src, ACTION, START, STOP};
    pub use crate::fsm::{bad_action, bad_source, bad_state, FsmState, StateMachine};
    pub use crate::options::PipeOptions;
    pub use crate::pipe::{Pipe, PipeId, PipeRef, PipeStatus};
    pub use crate::stats::{Statistic, StatsSink};
    pub use crate::worker::{PoolConfig, Worker, WorkerPool};
}
