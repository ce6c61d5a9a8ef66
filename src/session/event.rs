//! Asynchronous session events

/// Out-of-band notifications from an active session
///
/// Delivered on the receiver returned by
/// [`FtlStream::take_events`](crate::stream::FtlStream::take_events).
/// Delivery is best-effort: if the receiver is full or gone, events are
/// dropped rather than stalling the keepalive task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A keepalive ping went unanswered within its deadline
    KeepaliveMissed {
        /// Misses in a row, including this one
        consecutive: u32,
    },

    /// The session declared the connection lost and stopped pinging
    ///
    /// The stream still needs `deactivate` to release its resources.
    ConnectionLost { reason: String },
}
