//! Keepalive supervisor
//!
//! An active session pings the ingest on a fixed cadence to prove liveness
//! both ways. The supervisor is a single spawned task that owns the control
//! connection for the lifetime of the session; ownership comes back through
//! [`KeepaliveSupervisor::stop`], which joins the task first so no ping is
//! ever in flight when the teardown path takes over the socket.
//!
//! Misses are counted consecutively and surfaced as events. Exhausting the
//! miss budget, or any hard transport fault, declares the connection lost:
//! the shared flag flips, one `ConnectionLost` event fires, and the task
//! parks until stopped. It never tears the stream down itself; that stays
//! with the owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::FtlConfig;
use crate::net::ControlConnection;
use crate::protocol::constants::RESP_PING;
use crate::protocol::wire::Command;
use crate::session::event::SessionEvent;
use crate::stats::SharedStats;

/// Handle to the spawned keepalive task
pub(crate) struct KeepaliveSupervisor<S = TcpStream> {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<ControlConnection<S>>,
}

impl<S> KeepaliveSupervisor<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start supervising; the task takes ownership of the connection
    pub(crate) fn spawn(
        conn: ControlConnection<S>,
        channel_id: u64,
        cfg: &FtlConfig,
        stats: Arc<SharedStats>,
        events: mpsc::Sender<SessionEvent>,
        lost: Arc<AtomicBool>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = KeepaliveTask {
            conn,
            channel_id,
            interval: cfg.keepalive_interval,
            timeout: cfg.keepalive_timeout,
            budget: cfg.keepalive_miss_budget,
            stats,
            events,
            lost,
        };
        let handle = tokio::spawn(task.run(stop_rx));

        KeepaliveSupervisor { stop_tx, handle }
    }

    /// Stop the task and take the connection back
    ///
    /// Joins the task before returning, so the hand-back is exclusive.
    /// `None` only if the task failed, in which case the socket is already
    /// gone.
    pub(crate) async fn stop(self) -> Option<ControlConnection<S>> {
        let _ = self.stop_tx.send(());
        match self.handle.await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "keepalive task did not stop cleanly");
                None
            }
        }
    }

    /// Kill the task without joining; the connection goes down with it.
    /// Drop-path backstop only.
    pub(crate) fn abort(self) {
        self.handle.abort();
    }
}

struct KeepaliveTask<S> {
    conn: ControlConnection<S>,
    channel_id: u64,
    interval: Duration,
    timeout: Duration,
    budget: u32,
    stats: Arc<SharedStats>,
    events: mpsc::Sender<SessionEvent>,
    lost: Arc<AtomicBool>,
}

enum Round {
    Pong { rtt: Duration },
    Miss,
    Dead(String),
}

impl<S: AsyncRead + AsyncWrite + Unpin> KeepaliveTask<S> {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> ControlConnection<S> {
        // First ping one interval after activation; the handshake just
        // proved the connection live.
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    debug!(channel_id = self.channel_id, "keepalive supervisor stopped");
                    return self.conn;
                }
                _ = ticker.tick() => {
                    match self.ping_round().await {
                        Round::Pong { rtt } => {
                            self.stats.record_pong(rtt);
                            trace!(channel_id = self.channel_id, rtt = ?rtt, "keepalive answered");
                        }
                        Round::Miss => {
                            let consecutive = self.stats.record_miss();
                            warn!(
                                channel_id = self.channel_id,
                                consecutive,
                                "keepalive ping went unanswered"
                            );
                            let _ = self
                                .events
                                .try_send(SessionEvent::KeepaliveMissed { consecutive });

                            if consecutive >= self.budget {
                                let reason = format!(
                                    "{} consecutive keepalive pings unanswered",
                                    consecutive
                                );
                                return self.park_lost(reason, stop_rx).await;
                            }
                        }
                        Round::Dead(reason) => {
                            return self.park_lost(reason, stop_rx).await;
                        }
                    }
                }
            }
        }
    }

    /// One liveness round-trip
    async fn ping_round(&mut self) -> Round {
        self.stats.record_ping();
        let started = Instant::now();

        let ping = Command::Ping {
            channel_id: self.channel_id,
        };
        if let Err(e) = self.conn.send(&ping).await {
            return Round::Dead(format!("keepalive send failed: {}", e));
        }

        match self.conn.read_response_within(self.timeout).await {
            Ok(Some(resp)) if resp.code == RESP_PING => Round::Pong {
                rtt: started.elapsed(),
            },
            Ok(Some(resp)) => {
                warn!(
                    channel_id = self.channel_id,
                    code = resp.code,
                    "unexpected keepalive response"
                );
                Round::Miss
            }
            Ok(None) => Round::Miss,
            Err(e) => Round::Dead(format!("keepalive read failed: {}", e)),
        }
    }

    /// Mark the connection lost and hold the socket until stopped
    async fn park_lost(
        self,
        reason: String,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> ControlConnection<S> {
        warn!(
            channel_id = self.channel_id,
            reason = %reason,
            "connection lost; keepalive parked"
        );
        self.lost.store(true, Ordering::Release);
        let _ = self.events.try_send(SessionEvent::ConnectionLost { reason });

        let _ = (&mut stop_rx).await;
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::SharedStats;
    use crate::testing::read_frame;
    use tokio::io::AsyncWriteExt;

    fn fast_config(interval_ms: u64, timeout_ms: u64, budget: u32) -> FtlConfig {
        FtlConfig::default()
            .keepalive_interval(Duration::from_millis(interval_ms))
            .keepalive_timeout(Duration::from_millis(timeout_ms))
            .keepalive_miss_budget(budget)
    }

    fn harness() -> (
        Arc<SharedStats>,
        mpsc::Sender<SessionEvent>,
        mpsc::Receiver<SessionEvent>,
        Arc<AtomicBool>,
    ) {
        let stats = Arc::new(SharedStats::new());
        let (tx, rx) = mpsc::channel(16);
        let lost = Arc::new(AtomicBool::new(false));
        (stats, tx, rx, lost)
    }

    #[tokio::test]
    async fn test_pings_answered() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (stats, tx, _rx, lost) = harness();
        let cfg = fast_config(20, 500, 3);

        let sup = KeepaliveSupervisor::spawn(
            ControlConnection::new(client),
            7,
            &cfg,
            stats.clone(),
            tx,
            lost.clone(),
        );

        // Answer three pings, then keep the peer half alive
        let server = tokio::spawn(async move {
            let mut buf = Vec::new();
            for _ in 0..3 {
                let frame = read_frame(&mut server, &mut buf).await.unwrap().unwrap();
                assert_eq!(frame, "PING 7");
                server.write_all(b"201\n").await.unwrap();
            }
            server
        })
        .await
        .unwrap();

        // The third 201 may still be in flight; give the task a moment
        for _ in 0..100 {
            if stats.snapshot(Duration::ZERO).pongs_received >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = stats.snapshot(Duration::ZERO);
        assert!(snapshot.pings_sent >= 3);
        assert!(snapshot.pongs_received >= 3);
        assert!(snapshot.last_rtt.is_some());
        assert!(!lost.load(Ordering::Acquire));

        assert!(sup.stop().await.is_some());
        drop(server);
    }

    #[tokio::test]
    async fn test_miss_budget_declares_lost() {
        let (client, server) = tokio::io::duplex(1024);
        let (stats, tx, mut rx, lost) = harness();
        let cfg = fast_config(20, 30, 3);

        let sup = KeepaliveSupervisor::spawn(
            ControlConnection::new(client),
            7,
            &cfg,
            stats.clone(),
            tx,
            lost.clone(),
        );

        // The peer never answers
        for expected in 1..=3u32 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                event,
                SessionEvent::KeepaliveMissed {
                    consecutive: expected
                }
            );
        }

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SessionEvent::ConnectionLost { .. }));
        assert!(lost.load(Ordering::Acquire));

        // Parked: no further pings after the budget was spent
        let snapshot = stats.snapshot(Duration::ZERO);
        assert_eq!(snapshot.pings_sent, 3);
        assert_eq!(snapshot.pings_missed, 3);

        assert!(sup.stop().await.is_some());
        drop(server);
    }

    #[tokio::test]
    async fn test_peer_gone_declares_lost() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let (stats, tx, mut rx, lost) = harness();
        let cfg = fast_config(10, 100, 3);

        let sup = KeepaliveSupervisor::spawn(
            ControlConnection::new(client),
            7,
            &cfg,
            stats,
            tx,
            lost.clone(),
        );

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SessionEvent::ConnectionLost { .. }));
        assert!(lost.load(Ordering::Acquire));

        assert!(sup.stop().await.is_some());
    }

    #[tokio::test]
    async fn test_stop_before_first_ping() {
        let (client, server) = tokio::io::duplex(1024);
        let (stats, tx, _rx, lost) = harness();
        let cfg = fast_config(5_000, 5_000, 3);

        let sup = KeepaliveSupervisor::spawn(
            ControlConnection::new(client),
            7,
            &cfg,
            stats.clone(),
            tx,
            lost,
        );

        // Returns promptly; no interval has to elapse
        let conn = tokio::time::timeout(Duration::from_secs(1), sup.stop())
            .await
            .unwrap();
        assert!(conn.is_some());
        assert_eq!(stats.snapshot(Duration::ZERO).pings_sent, 0);
        drop(server);
    }
}
