//! Connection lifecycle states
//!
//! Exactly one state holds at any time, and every change goes through the
//! guard table below. A rejected change never mutates state.

use std::fmt;

/// Connection state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle; also the initial state
    Disconnected,
    /// First open of a session in flight
    Connecting,
    /// Channel open and writable
    Connected,
    /// Session dropped; backoff timer or re-open in flight
    Reconnecting,
    /// Session over; waits for an explicit connect or disconnect
    Error,
}

impl ConnectionState {
    /// Whether the guard table allows moving to `next`.
    ///
    /// Self-transitions are always allowed. Note the two deliberate holes:
    /// an established session never re-enters `Connecting` (a dropped one
    /// goes through `Reconnecting`), and `Error` is only left through an
    /// explicit intent or a reconnect.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self == next {
            return true;
        }
        match (self, next) {
            (Disconnected, Connecting | Error) => true,
            (Disconnected, _) => false,
            (Connecting, _) => true,
            (Connected, Connecting) => false,
            (Connected, _) => true,
            (Reconnecting, Connecting) => false,
            (Reconnecting, _) => true,
            (Error, Connected) => false,
            (Error, _) => true,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}
