//! Connection statistics.
//!
//! Listener and connection machines report lifecycle counters through a
//! [`StatsSink`]. Reporting is fire-and-forget: a sink without a receiver,
//! or whose receiver is gone, silently drops the update.

use std::fmt;

/// Counters reported by the connection lifecycle machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// A listener handed over a new connection.
    AcceptedConnections,

    /// An accept attempt failed; the listener retries.
    AcceptErrors,

    /// An established connection failed.
    BrokenConnections,

    /// A connection was closed before it was established.
    DroppedConnections,
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AcceptedConnections => "accepted connections",
            Self::AcceptErrors => "accept errors",
            Self::BrokenConnections => "broken connections",
            Self::DroppedConnections => "dropped connections",
        };
        f.write_str(name)
    }
}

/// One counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatUpdate {
    pub stat: Statistic,
    pub delta: u64,
}

/// Handle for receiving statistic updates.
pub type StatsMonitor = flume::Receiver<StatUpdate>;

/// Cloneable reporting side of the statistics channel.
#[derive(Debug, Clone, Default)]
pub struct StatsSink {
    tx: Option<flume::Sender<StatUpdate>>,
}

impl StatsSink {
    /// A sink that discards everything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn incr(&self, stat: Statistic) {
        self.add(stat, 1);
    }

    pub fn add(&self, stat: Statistic, delta: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(StatUpdate { stat, delta });
        }
    }
}

/// Creates a new statistics channel pair.
#[must_use]
pub fn create_monitor() -> (StatsSink, StatsMonitor) {
    let (tx, rx) = flume::unbounded();
    (StatsSink { tx: Some(tx) }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistic_display() {
        assert_eq!(Statistic::AcceptErrors.to_string(), "accept errors");
    }

    #[test]
    fn test_monitor_channel() {
        let (sink, monitor) = create_monitor();
        sink.incr(Statistic::AcceptedConnections);
        sink.add(Statistic::BrokenConnections, 2);

        let updates: Vec<_> = monitor.try_iter().collect();
        assert_eq!(
            updates,
            vec![
                StatUpdate {
                    stat: Statistic::AcceptedConnections,
                    delta: 1
                },
                StatUpdate {
                    stat: Statistic::BrokenConnections,
                    delta: 2
                },
            ]
        );
    }

    #[test]
    fn test_disabled_and_orphaned_sinks_do_not_fail() {
        StatsSink::disabled().incr(Statistic::DroppedConnections);
        let (sink, monitor) = create_monitor();
        drop(monitor);
        sink.incr(Statistic::DroppedConnections);
    }
}
