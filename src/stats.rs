//! Session statistics

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time statistics for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Keepalive pings sent
    pub pings_sent: u64,
    /// Ping responses received in time
    pub pongs_received: u64,
    /// Pings that went unanswered
    pub pings_missed: u64,
    /// Current run of unanswered pings
    pub consecutive_misses: u32,
    /// Round-trip time of the most recent answered ping
    pub last_rtt: Option<Duration>,
    /// Time since the session was established
    pub duration: Duration,
}

/// Live counters shared between the stream handle and the keepalive task
///
/// Counters only; ordering between them carries no meaning, so all access
/// is `Relaxed`.
#[derive(Debug, Default)]
pub struct SharedStats {
    pings_sent: AtomicU64,
    pongs_received: AtomicU64,
    pings_missed: AtomicU64,
    consecutive_misses: AtomicU32,
    // Micros; zero means no ping has been answered yet
    last_rtt_micros: AtomicU64,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pong(&self, rtt: Duration) {
        self.pongs_received.fetch_add(1, Ordering::Relaxed);
        self.consecutive_misses.store(0, Ordering::Relaxed);
        self.last_rtt_micros
            .store(rtt.as_micros().max(1) as u64, Ordering::Relaxed);
    }

    /// Record an unanswered ping and return the new consecutive-miss count
    pub fn record_miss(&self) -> u32 {
        self.pings_missed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_misses.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Clear all counters for a fresh session
    pub fn reset(&self) {
        self.pings_sent.store(0, Ordering::Relaxed);
        self.pongs_received.store(0, Ordering::Relaxed);
        self.pings_missed.store(0, Ordering::Relaxed);
        self.consecutive_misses.store(0, Ordering::Relaxed);
        self.last_rtt_micros.store(0, Ordering::Relaxed);
    }

    /// Snapshot the counters; the caller supplies the session duration
    pub fn snapshot(&self, duration: Duration) -> SessionStats {
        let rtt_micros = self.last_rtt_micros.load(Ordering::Relaxed);
        SessionStats {
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            pongs_received: self.pongs_received.load(Ordering::Relaxed),
            pings_missed: self.pings_missed.load(Ordering::Relaxed),
            consecutive_misses: self.consecutive_misses.load(Ordering::Relaxed),
            last_rtt: (rtt_micros > 0).then(|| Duration::from_micros(rtt_micros)),
            duration,
        }
    }
}
