//! Stream handle and lifecycle
//!
//! [`FtlStream`] owns everything about one ingest stream: its settings,
//! its media components, and the session resources that exist while it is
//! active. All mutating operations take `&mut self`, which makes the
//! handle itself the mutual-exclusion boundary; the only concurrent actor
//! is the keepalive task, and it owns the control connection outright until
//! it is stopped and joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::component::{AudioComponent, VideoComponent};
use crate::config::FtlConfig;
use crate::error::{FtlError, Result};
use crate::protocol::wire::Command;
use crate::session::event::SessionEvent;
use crate::session::handshake::{self, HandshakeParams, MediaPlan};
use crate::session::keepalive::KeepaliveSupervisor;
use crate::session::state::StreamState;
use crate::stats::{SessionStats, SharedStats};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Create a stream handle in the given slot with default configuration
///
/// The slot must be empty; a non-empty slot fails with
/// [`FtlError::NonZeroPointer`] and nothing is allocated.
pub fn create_stream(slot: &mut Option<FtlStream>) -> Result<()> {
    create_stream_with_config(slot, FtlConfig::default())
}

/// Create a stream handle with explicit configuration
pub fn create_stream_with_config(slot: &mut Option<FtlStream>, config: FtlConfig) -> Result<()> {
    crate::init::ensure_initialized()?;
    if slot.is_some() {
        return Err(FtlError::NonZeroPointer);
    }
    *slot = Some(FtlStream::new(config));
    Ok(())
}

/// Tear down a stream and empty its slot
///
/// An active stream is deactivated first, best-effort. Destroying an
/// already-empty slot is a no-op.
pub async fn destroy_stream(slot: &mut Option<FtlStream>) -> Result<()> {
    let Some(mut stream) = slot.take() else {
        debug!("destroy on empty slot");
        return Ok(());
    };

    if stream.state.is_active() {
        if let Err(e) = stream.deactivate().await {
            warn!(error = %e, "deactivate during destroy failed");
        }
    }

    Ok(())
}

/// One stream to one ingest
///
/// # Example
/// ```no_run
/// use ftl_rs::{AudioComponent, VideoComponent};
///
/// # async fn example() -> ftl_rs::Result<()> {
/// ftl_rs::init()?;
///
/// let mut slot = None;
/// ftl_rs::create_stream(&mut slot)?;
/// let stream = slot.as_mut().unwrap();
///
/// stream.set_ingest_location("ingest.example.com")?;
/// stream.set_authentication(1234, "stream-key")?;
/// stream.attach_audio_component(AudioComponent::opus())?;
/// stream.attach_video_component(VideoComponent::vp8(1920, 1080)?)?;
///
/// stream.activate().await?;
/// // ... media flows over RTP using the negotiated parameters ...
/// stream.deactivate().await?;
///
/// ftl_rs::destroy_stream(&mut slot).await?;
/// # Ok(())
/// # }
/// ```
pub struct FtlStream {
    ingest_location: Option<String>,
    channel_id: u64,
    stream_key: Option<String>,
    audio: Option<AudioComponent>,
    video: Option<VideoComponent>,
    config: FtlConfig,
    state: StreamState,

    // Session-scoped: exist exactly while a session is up
    supervisor: Option<KeepaliveSupervisor>,
    plan: Option<MediaPlan>,
    media_port: Option<u16>,
    pending_events: Option<mpsc::Receiver<SessionEvent>>,
    session_started: Option<Instant>,
    shared_stats: Arc<SharedStats>,
    lost: Arc<AtomicBool>,
}

impl FtlStream {
    pub(crate) fn new(config: FtlConfig) -> Self {
        FtlStream {
            ingest_location: None,
            channel_id: 0,
            stream_key: None,
            audio: None,
            video: None,
            config,
            state: StreamState::Created,
            supervisor: None,
            plan: None,
            media_port: None,
            pending_events: None,
            session_started: None,
            shared_stats: Arc::new(SharedStats::new()),
            lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the ingest hostname or IP address
    pub fn set_ingest_location(&mut self, location: impl Into<String>) -> Result<()> {
        self.ensure_configurable()?;
        self.ingest_location = Some(location.into());
        Ok(())
    }

    /// Set the channel id and its stream key
    pub fn set_authentication(&mut self, channel_id: u64, stream_key: impl Into<String>) -> Result<()> {
        self.ensure_configurable()?;
        self.channel_id = channel_id;
        self.stream_key = Some(stream_key.into());
        Ok(())
    }

    /// Attach an audio component, replacing any previous one
    pub fn attach_audio_component(&mut self, component: AudioComponent) -> Result<()> {
        self.ensure_configurable()?;
        self.audio = Some(component);
        Ok(())
    }

    /// Attach a video component, replacing any previous one
    pub fn attach_video_component(&mut self, component: VideoComponent) -> Result<()> {
        self.ensure_configurable()?;
        self.video = Some(component);
        Ok(())
    }

    /// Connect, authenticate, negotiate, and start the keepalive
    ///
    /// Suspends until the handshake reaches a terminal outcome. On failure
    /// the stream returns to `Inactive` with no resources retained and the
    /// terminal error is the result.
    pub async fn activate(&mut self) -> Result<()> {
        if !self.state.can_activate() {
            return Err(FtlError::ConfigError("stream is already active"));
        }
        let host = self
            .ingest_location
            .clone()
            .ok_or(FtlError::ConfigError("ingest location is not set"))?;
        let key = self
            .stream_key
            .clone()
            .ok_or(FtlError::ConfigError("authentication is not set"))?;
        if self.audio.is_none() && self.video.is_none() {
            return Err(FtlError::ConfigError("no media components attached"));
        }

        self.state = StreamState::Connecting;
        debug!(host = %host, channel_id = self.channel_id, "activating stream");

        let params = HandshakeParams {
            host: &host,
            channel_id: self.channel_id,
            stream_key: key.as_bytes(),
            audio: self.audio,
            video: self.video,
        };
        let outcome = match handshake::run(&params, &self.config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = StreamState::Inactive;
                return Err(e);
            }
        };

        self.shared_stats.reset();
        self.lost = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        self.plan = Some(outcome.plan);
        self.media_port = outcome.media_port;
        self.session_started = Some(Instant::now());
        self.pending_events = Some(event_rx);
        self.supervisor = Some(KeepaliveSupervisor::spawn(
            outcome.conn,
            self.channel_id,
            &self.config,
            self.shared_stats.clone(),
            event_tx,
            self.lost.clone(),
        ));
        self.state = StreamState::Active;

        info!(
            host = %host,
            channel_id = self.channel_id,
            media_port = ?self.media_port,
            "stream active"
        );
        Ok(())
    }

    /// Stop the session and release its resources
    ///
    /// The keepalive task is stopped and joined before the connection is
    /// touched, then `DISCONNECT` goes out best-effort (skipped when the
    /// connection is already lost) and the socket closes. Fails with
    /// [`FtlError::NotActiveStream`] unless the stream is active.
    pub async fn deactivate(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(FtlError::NotActiveStream);
        }
        self.state = StreamState::Disconnecting;
        debug!(channel_id = self.channel_id, "deactivating stream");

        if let Some(supervisor) = self.supervisor.take() {
            if let Some(mut conn) = supervisor.stop().await {
                if self.lost.load(Ordering::Acquire) {
                    debug!("connection already lost; skipping disconnect exchange");
                } else {
                    match tokio::time::timeout(
                        self.config.disconnect_timeout,
                        conn.send(&Command::Disconnect),
                    )
                    .await
                    {
                        Ok(Ok(())) => debug!("disconnect delivered"),
                        Ok(Err(e)) => warn!(error = %e, "disconnect delivery failed"),
                        Err(_) => warn!("disconnect delivery timed out"),
                    }
                    let _ = tokio::time::timeout(self.config.disconnect_timeout, conn.shutdown())
                        .await;
                }
            }
        }

        self.clear_session();
        self.state = StreamState::Inactive;
        info!(channel_id = self.channel_id, "stream deactivated");
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether a session is established
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the keepalive declared the connection lost
    ///
    /// A lost stream still needs [`deactivate`](Self::deactivate).
    pub fn connection_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Take the event receiver for the current session
    ///
    /// Available once per activation; `None` if not active or already
    /// taken.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.pending_events.take()
    }

    /// Snapshot of the session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = self
            .session_started
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.shared_stats.snapshot(duration)
    }

    /// Final RTP parameters negotiated for this session
    pub fn negotiated_media(&self) -> Option<MediaPlan> {
        self.plan
    }

    /// UDP media port announced by the ingest, if any
    pub fn media_port(&self) -> Option<u16> {
        self.media_port
    }

    pub fn ingest_location(&self) -> Option<&str> {
        self.ingest_location.as_deref()
    }

    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    pub fn audio_component(&self) -> Option<AudioComponent> {
        self.audio
    }

    pub fn video_component(&self) -> Option<VideoComponent> {
        self.video
    }

    pub fn config(&self) -> &FtlConfig {
        &self.config
    }

    fn ensure_configurable(&self) -> Result<()> {
        if !self.state.is_configurable() {
            return Err(FtlError::ConfigError(
                "configuration is frozen while the stream is in use",
            ));
        }
        Ok(())
    }

    fn clear_session(&mut self) {
        self.plan = None;
        self.media_port = None;
        self.pending_events = None;
        self.session_started = None;
        self.shared_stats.reset();
        self.lost.store(false, Ordering::Release);
    }
}

impl Drop for FtlStream {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            warn!(
                channel_id = self.channel_id,
                "stream dropped while active; aborting keepalive task"
            );
            supervisor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{AudioCodec, VideoCodec};
    use crate::testing::{MockBehavior, MockIngest};
    use std::time::Duration;

    fn fast_timeouts(port: u16) -> FtlConfig {
        FtlConfig::default()
            .ingest_port(port)
            .resolve_timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(2))
            .response_timeout(Duration::from_secs(2))
            .disconnect_timeout(Duration::from_millis(500))
    }

    fn configured_stream(mock: &MockIngest, key: &str) -> FtlStream {
        crate::init().unwrap();
        let mut slot = None;
        create_stream_with_config(&mut slot, fast_timeouts(mock.port())).unwrap();
        let mut stream = slot.take().unwrap();

        stream.set_ingest_location(mock.host()).unwrap();
        stream.set_authentication(1234, key).unwrap();
        stream
            .attach_audio_component(AudioComponent::opus())
            .unwrap();
        stream
            .attach_video_component(VideoComponent::vp8(1920, 1080).unwrap())
            .unwrap();
        stream
    }

    async fn wait_for_disconnect(mock: &MockIngest) -> bool {
        for _ in 0..100 {
            if mock.commands().contains(&Command::Disconnect) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_create_stream_requires_empty_slot() {
        crate::init().unwrap();

        let mut slot = None;
        create_stream(&mut slot).unwrap();
        assert_eq!(slot.as_ref().unwrap().state(), StreamState::Created);

        let err = create_stream(&mut slot).unwrap_err();
        assert!(matches!(err, FtlError::NonZeroPointer));
        assert!(slot.is_some());
    }

    #[test]
    fn test_setters_and_attachment() {
        crate::init().unwrap();
        let mut slot = None;
        create_stream(&mut slot).unwrap();
        let stream = slot.as_mut().unwrap();

        stream.set_ingest_location("ingest.example.com").unwrap();
        stream.set_authentication(42, "key").unwrap();
        assert_eq!(stream.ingest_location(), Some("ingest.example.com"));
        assert_eq!(stream.channel_id(), 42);

        stream
            .attach_video_component(VideoComponent::vp8(1280, 720).unwrap())
            .unwrap();
        stream
            .attach_video_component(VideoComponent::vp8(1920, 1080).unwrap())
            .unwrap();

        // Second attach replaced the first
        let video = stream.video_component().unwrap();
        assert_eq!(video.width(), 1920);
        assert!(stream.audio_component().is_none());
    }

    #[tokio::test]
    async fn test_activate_rejects_missing_configuration() {
        crate::init().unwrap();
        let mut slot = None;
        create_stream(&mut slot).unwrap();
        let stream = slot.as_mut().unwrap();

        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));

        stream.set_ingest_location("127.0.0.1").unwrap();
        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));

        stream.set_authentication(1, "key").unwrap();
        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));

        // No connection was attempted; the stream is still configurable
        assert_eq!(stream.state(), StreamState::Created);
    }

    #[tokio::test]
    async fn test_deactivate_requires_active() {
        crate::init().unwrap();
        let mut slot = None;
        create_stream(&mut slot).unwrap();
        let stream = slot.as_mut().unwrap();

        let err = stream.deactivate().await.unwrap_err();
        assert!(matches!(err, FtlError::NotActiveStream));
        assert_eq!(stream.state(), StreamState::Created);
    }

    #[tokio::test]
    async fn test_activate_deactivate_full_scenario() {
        let mock = MockIngest::spawn(MockBehavior::accept_all(b"secret").media_port(8082)).await;
        let mut stream = configured_stream(&mock, "secret");

        stream.activate().await.unwrap();
        assert!(stream.is_active());
        assert_eq!(stream.state(), StreamState::Active);
        assert_eq!(stream.media_port(), Some(8082));

        let plan = stream.negotiated_media().unwrap();
        let audio = plan.audio.unwrap();
        let video = plan.video.unwrap();
        assert_ne!(audio.ssrc, video.ssrc);
        assert_ne!(audio.ssrc, 0);
        assert_ne!(video.ssrc, 0);

        // Settings are frozen while active
        let err = stream.set_ingest_location("elsewhere").unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));
        let err = stream
            .attach_audio_component(AudioComponent::opus())
            .unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));
        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));

        stream.deactivate().await.unwrap();
        assert_eq!(stream.state(), StreamState::Inactive);
        assert!(stream.negotiated_media().is_none());
        assert!(stream.media_port().is_none());
        assert_eq!(stream.stats(), SessionStats::default());
        assert!(!stream.connection_lost());

        let err = stream.deactivate().await.unwrap_err();
        assert!(matches!(err, FtlError::NotActiveStream));

        // Components and settings survive deactivation
        assert!(stream.audio_component().is_some());
        assert!(stream.video_component().is_some());
        assert_eq!(stream.channel_id(), 1234);

        assert!(wait_for_disconnect(&mock).await);

        // Behaviorally fresh: a second session works the same way
        stream.activate().await.unwrap();
        assert!(stream.is_active());
        stream.deactivate().await.unwrap();
        assert_eq!(stream.state(), StreamState::Inactive);

        drop(stream);
        let commands = mock.stop().await;
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::Connect { channel_id: 1234, .. })));
        assert!(commands.contains(&Command::attribute("VideoWidth", 1920)));
        assert!(commands.contains(&Command::attribute("AudioCodec", "OPUS")));
    }

    #[tokio::test]
    async fn test_activate_rejected_authentication() {
        let mock = MockIngest::spawn(MockBehavior::RejectAuth { code: 401 }).await;
        let mut stream = configured_stream(&mock, "wrong");

        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::StreamRejected { code: 401 }));
        assert_eq!(stream.state(), StreamState::Inactive);
        assert!(stream.negotiated_media().is_none());
        assert!(stream.take_events().is_none());

        drop(stream);
        mock.stop().await;
    }

    #[tokio::test]
    async fn test_activate_rejected_negotiation() {
        let mock = MockIngest::spawn(MockBehavior::RejectNegotiation {
            stream_key: b"secret".to_vec(),
            code: 500,
        })
        .await;
        let mut stream = configured_stream(&mock, "secret");

        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::StreamRejected { code: 500 }));
        assert_eq!(stream.state(), StreamState::Inactive);

        drop(stream);
        mock.stop().await;
    }

    #[tokio::test]
    async fn test_activate_dns_failure() {
        crate::init().unwrap();
        let mut slot = None;
        create_stream_with_config(&mut slot, fast_timeouts(8084)).unwrap();
        let stream = slot.as_mut().unwrap();

        stream.set_ingest_location("ingest.invalid").unwrap();
        stream.set_authentication(1, "key").unwrap();
        stream
            .attach_audio_component(AudioComponent::opus())
            .unwrap();

        let err = stream.activate().await.unwrap_err();
        assert!(matches!(err, FtlError::DnsFailure { .. }));
        assert_eq!(stream.state(), StreamState::Inactive);
    }

    #[tokio::test]
    async fn test_destroy_active_stream() {
        let mock = MockIngest::spawn(MockBehavior::accept_all(b"secret")).await;
        let mut slot = Some(configured_stream(&mock, "secret"));
        slot.as_mut().unwrap().activate().await.unwrap();

        destroy_stream(&mut slot).await.unwrap();
        assert!(slot.is_none());
        assert!(wait_for_disconnect(&mock).await);
        mock.stop().await;
    }

    #[tokio::test]
    async fn test_destroy_empty_slot() {
        let mut slot: Option<FtlStream> = None;
        destroy_stream(&mut slot).await.unwrap();
        assert!(slot.is_none());
    }

    #[tokio::test]
    async fn test_events_surface_connection_loss() {
        let mock = MockIngest::spawn(
            MockBehavior::accept_all(b"secret").ignore_pings(),
        )
        .await;
        let config = fast_timeouts(mock.port())
            .keepalive_interval(Duration::from_millis(20))
            .keepalive_timeout(Duration::from_millis(30))
            .keepalive_miss_budget(2);

        crate::init().unwrap();
        let mut slot = None;
        create_stream_with_config(&mut slot, config).unwrap();
        let stream = slot.as_mut().unwrap();
        stream.set_ingest_location(mock.host()).unwrap();
        stream.set_authentication(1234, "secret").unwrap();
        stream
            .attach_audio_component(AudioComponent::opus())
            .unwrap();

        stream.activate().await.unwrap();
        let mut events = stream.take_events().unwrap();
        assert!(stream.take_events().is_none());

        let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, SessionEvent::KeepaliveMissed { consecutive: 1 });

        let mut saw_lost = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(2), events.recv()).await
        {
            if matches!(event, SessionEvent::ConnectionLost { .. }) {
                saw_lost = true;
                break;
            }
        }
        assert!(saw_lost);
        assert!(stream.connection_lost());
        assert!(stream.is_active());

        // Teardown skips the disconnect exchange on a lost connection
        stream.deactivate().await.unwrap();
        assert_eq!(stream.state(), StreamState::Inactive);
        assert!(!stream.connection_lost());

        drop(slot);
        let commands = mock.stop().await;
        assert!(!commands.contains(&Command::Disconnect));
        assert!(commands.iter().any(|c| matches!(c, Command::Ping { .. })));
    }

    #[tokio::test]
    async fn test_null_codec_components_negotiate_disabled() {
        let mock = MockIngest::spawn(MockBehavior::accept_all(b"secret")).await;
        crate::init().unwrap();

        let mut slot = None;
        create_stream_with_config(&mut slot, fast_timeouts(mock.port())).unwrap();
        let stream = slot.as_mut().unwrap();
        stream.set_ingest_location(mock.host()).unwrap();
        stream.set_authentication(1234, "secret").unwrap();
        stream
            .attach_audio_component(AudioComponent::opus())
            .unwrap();
        stream
            .attach_video_component(VideoComponent::new(VideoCodec::Null, 0, 0, 0, 0).unwrap())
            .unwrap();

        stream.activate().await.unwrap();
        let plan = stream.negotiated_media().unwrap();
        assert!(plan.audio.is_some());
        assert!(plan.video.is_none());

        stream.deactivate().await.unwrap();
        drop(slot);

        let commands = mock.stop().await;
        assert!(commands.contains(&Command::attribute("Video", "false")));
        assert!(commands.contains(&Command::attribute("Audio", "true")));
    }

    #[test]
    fn test_component_codec_validation_still_reachable() {
        // Descriptor validation happens at construction, before any attach
        let err = AudioComponent::new(AudioCodec::Opus, 200, 0).unwrap_err();
        assert!(matches!(err, FtlError::ConfigError(_)));
    }
}
