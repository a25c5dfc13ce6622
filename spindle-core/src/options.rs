//! Pipe configuration options
//!
//! Priorities run from 1 (highest) to 16 (lowest); 8 is the default for both
//! directions.

use std::io;

/// Highest priority value.
pub const MIN_PRIORITY: u8 = 1;

/// Lowest priority value.
pub const MAX_PRIORITY: u8 = 16;

/// Priority of a pipe that does not ask for one.
pub const DEFAULT_PRIORITY: u8 = 8;

/// Per-pipe options fixed when the pipe is created.
///
/// # Examples
///
/// ```
/// use spindle_core::options::PipeOptions;
///
/// let opts = PipeOptions::default()
///     .with_send_priority(1)
///     .with_recv_priority(4);
/// assert_eq!(opts.send_priority, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Outbound priority, used by load balancing
    ///
    /// Load balancing only picks a pipe of priority N when no pipe of a
    /// smaller priority number can accept a message.
    pub send_priority: u8,

    /// Inbound priority, used by fair queuing
    ///
    /// Fair queuing drains pipes of the smallest priority number first.
    pub recv_priority: u8,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            send_priority: DEFAULT_PRIORITY,
            recv_priority: DEFAULT_PRIORITY,
        }
    }
}

impl PipeOptions {
    /// Create new options with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `priority` is outside `1..=16`.
    #[must_use]
    #[track_caller]
    pub fn with_send_priority(mut self, priority: u8) -> Self {
        self.send_priority = expect_priority(priority);
        self
    }

    /// # Panics
    ///
    /// Panics if `priority` is outside `1..=16`.
    #[must_use]
    #[track_caller]
    pub fn with_recv_priority(mut self, priority: u8) -> Self {
        self.recv_priority = expect_priority(priority);
        self
    }

    /// Validate a priority supplied at runtime (e.g. from a socket option).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the value is outside `1..=16`.
    pub fn validate_priority(priority: i64) -> io::Result<u8> {
        match u8::try_from(priority) {
            Ok(p) if (MIN_PRIORITY..=MAX_PRIORITY).contains(&p) => Ok(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("priority must be in {MIN_PRIORITY}..={MAX_PRIORITY}, got {priority}"),
            )),
        }
    }
}

#[track_caller]
fn expect_priority(priority: u8) -> u8 {
    assert!(
        (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority),
        "priority {priority} out of range {MIN_PRIORITY}..={MAX_PRIORITY}"
    );
    priority
}
