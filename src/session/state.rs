//! Stream lifecycle state machine
//!
//! Tracks one stream from creation through activation to teardown. The
//! aggregate in [`crate::stream`] owns a `StreamState` and consults it
//! before every operation; no operation moves the state except through the
//! transitions here.

use std::fmt;

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, never activated
    Created,
    /// Deactivated after at least one session; equivalent to `Created` for
    /// every permitted operation
    Inactive,
    /// Handshake in flight
    Connecting,
    /// Session established, keepalive running
    Active,
    /// Teardown in flight
    Disconnecting,
}

impl StreamState {
    /// Whether setters and component attachment are allowed
    ///
    /// Configuration is frozen from the moment a connection attempt starts.
    pub fn is_configurable(&self) -> bool {
        matches!(self, StreamState::Created | StreamState::Inactive)
    }

    /// Whether `activate` may start a session from this state
    pub fn can_activate(&self) -> bool {
        matches!(self, StreamState::Created | StreamState::Inactive)
    }

    /// Whether a session is established
    pub fn is_active(&self) -> bool {
        matches!(self, StreamState::Active)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Created => "created",
            StreamState::Inactive => "inactive",
            StreamState::Connecting => "connecting",
            StreamState::Active => "active",
            StreamState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}
