//! Socket type enumeration for scalability-protocol sockets.
//!
//! Numbers follow the SP wire convention: protocol family in the high nibble,
//! role in the low one.

use std::fmt;

/// Scalability-protocol socket types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SocketType {
    /// PAIR socket for exclusive bidirectional communication
    Pair = 16,

    /// PUB socket broadcasting to every connected subscriber
    Pub = 32,

    /// SUB socket receiving the messages matching its subscriptions
    Sub = 33,

    /// REQ socket sending load-balanced requests
    Req = 48,

    /// REP socket fair-queueing requests
    Rep = 49,

    /// PUSH socket distributing messages to pullers
    Push = 80,

    /// PULL socket fair-queueing messages from pushers
    Pull = 81,
}

impl SocketType {
    /// Get the socket type as a string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
        }
    }

    /// Wire number of the type.
    #[inline]
    pub const fn number(self) -> u16 {
        self as u16
    }

    /// Check if this socket type is compatible with the given peer type.
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_type_display() {
        assert_eq!(SocketType::Push.to_string(), "PUSH");
        assert_eq!(SocketType::Sub.to_string(), "SUB");
        assert_eq!(SocketType::Pair.to_string(), "PAIR");
    }

    #[test]
    fn test_socket_type_numbers() {
        assert_eq!(SocketType::Pair.number(), 16);
        assert_eq!(SocketType::Sub.number(), 33);
        assert_eq!(SocketType::Pull.number(), 81);
    }

    #[test]
    fn test_socket_compatibility() {
        assert!(SocketType::Req.is_compatible(SocketType::Rep));
        assert!(SocketType::Push.is_compatible(SocketType::Pull));
        assert!(SocketType::Sub.is_compatible(SocketType::Pub));
        assert!(SocketType::Pair.is_compatible(SocketType::Pair));

        assert!(!SocketType::Push.is_compatible(SocketType::Push));
        assert!(!SocketType::Pub.is_compatible(SocketType::Pull));
        assert!(!SocketType::Req.is_compatible(SocketType::Req));
    }
}
