//! Control-channel handshake
//!
//! Establishing a session walks four phases in order:
//!
//! 1. **Resolving** — the ingest location becomes a ranked candidate list.
//! 2. **Connecting** — candidates are tried in order until a TCP connection
//!    sticks.
//! 3. **Authenticating** — `HMAC` fetches a salt, `CONNECT` presents the
//!    channel id and proof.
//! 4. **Negotiating** — media attributes are declared and the end marker
//!    awaits the accept response, which may name the UDP media port.
//!
//! Success yields the live connection plus the resolved [`MediaPlan`];
//! the caller hands both to the keepalive supervisor. Every failure path
//! drops the socket on the way out.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::component::{AudioComponent, VideoComponent};
use crate::config::FtlConfig;
use crate::error::{FtlError, Result};
use crate::net::{resolver, ControlConnection};
use crate::protocol::auth;
use crate::protocol::constants::{
    DEFAULT_AUDIO_PAYLOAD_TYPE, DEFAULT_VIDEO_PAYLOAD_TYPE, PROTOCOL_VERSION,
    RTP_DYNAMIC_PAYLOAD_MAX, RTP_DYNAMIC_PAYLOAD_MIN,
};
use crate::protocol::wire::Command;

/// Handshake progress, traced on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No handshake attempted yet
    Idle,
    /// Resolving the ingest location
    Resolving,
    /// Trying resolved candidates
    Connecting,
    /// HMAC challenge in flight
    Authenticating,
    /// Declaring media attributes
    Negotiating,
    /// Ingest accepted the stream
    Accepted,
    /// Ingest turned the stream away
    Rejected,
}

impl std::fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakePhase::Idle => "idle",
            HandshakePhase::Resolving => "resolving",
            HandshakePhase::Connecting => "connecting",
            HandshakePhase::Authenticating => "authenticating",
            HandshakePhase::Negotiating => "negotiating",
            HandshakePhase::Accepted => "accepted",
            HandshakePhase::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// RTP parameters for one negotiated component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedComponent {
    pub payload_type: u8,
    pub ssrc: u32,
}

/// Final RTP parameters after auto sentinels are resolved
///
/// `None` for a kind means no media of that kind will flow, either because
/// the component was never attached or because it declared the `Null`
/// codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaPlan {
    pub audio: Option<NegotiatedComponent>,
    pub video: Option<NegotiatedComponent>,
}

/// Everything the handshake needs to know about the stream
pub(crate) struct HandshakeParams<'a> {
    pub host: &'a str,
    pub channel_id: u64,
    pub stream_key: &'a [u8],
    pub audio: Option<AudioComponent>,
    pub video: Option<VideoComponent>,
}

/// What a successful handshake hands back
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    pub conn: ControlConnection,
    pub plan: MediaPlan,
    pub media_port: Option<u16>,
}

/// Run the complete handshake against the configured ingest
pub(crate) async fn run(params: &HandshakeParams<'_>, cfg: &FtlConfig) -> Result<HandshakeOutcome> {
    trace_phase(HandshakePhase::Resolving, params);
    let candidates = resolver::resolve(params.host, cfg.ingest_port, cfg.resolve_timeout).await?;

    trace_phase(HandshakePhase::Connecting, params);
    let stream = connect_any(params.host, &candidates, cfg).await?;
    let mut conn = ControlConnection::new(stream);

    trace_phase(HandshakePhase::Authenticating, params);
    if let Err(e) = authenticate(&mut conn, params, cfg).await {
        trace_phase(HandshakePhase::Rejected, params);
        return Err(e);
    }

    trace_phase(HandshakePhase::Negotiating, params);
    let plan = resolve_media_plan(params.audio.as_ref(), params.video.as_ref());
    let media_port = match negotiate(&mut conn, params, &plan, cfg).await {
        Ok(port) => port,
        Err(e) => {
            trace_phase(HandshakePhase::Rejected, params);
            return Err(e);
        }
    };

    trace_phase(HandshakePhase::Accepted, params);
    Ok(HandshakeOutcome {
        conn,
        plan,
        media_port,
    })
}

fn trace_phase(phase: HandshakePhase, params: &HandshakeParams<'_>) {
    debug!(
        phase = %phase,
        host = %params.host,
        channel_id = params.channel_id,
        "handshake phase"
    );
}

/// Try candidates in order until one connects
async fn connect_any(
    host: &str,
    candidates: &[SocketAddr],
    cfg: &FtlConfig,
) -> Result<TcpStream> {
    for addr in candidates {
        match tokio::time::timeout(cfg.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if cfg.tcp_nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(addr = %addr, error = %e, "failed to set TCP_NODELAY");
                    }
                }
                debug!(addr = %addr, "connected to ingest");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(addr = %addr, error = %e, "connect attempt failed");
            }
            Err(_) => {
                debug!(addr = %addr, "connect attempt timed out");
            }
        }
    }

    Err(FtlError::ConnectError {
        host: host.to_string(),
        attempts: candidates.len(),
    })
}

/// HMAC challenge: fetch the salt, present channel id and proof
async fn authenticate<S>(
    conn: &mut ControlConnection<S>,
    params: &HandshakeParams<'_>,
    cfg: &FtlConfig,
) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let resp = conn.request(&Command::Hmac, cfg.response_timeout).await?;
    if !resp.is_ok() {
        return Err(FtlError::StreamRejected { code: resp.code });
    }
    if resp.detail.is_empty() {
        return Err(FtlError::internal("ingest sent no hmac salt"));
    }

    let proof = auth::proof(params.stream_key, &resp.detail)?;
    let resp = conn
        .request(
            &Command::Connect {
                channel_id: params.channel_id,
                proof,
            },
            cfg.response_timeout,
        )
        .await?;
    if !resp.is_ok() {
        return Err(FtlError::StreamRejected { code: resp.code });
    }

    Ok(())
}

/// Declare the media attributes and await acceptance
///
/// Attributes stream without individual acknowledgement; the single accept
/// or reject response follows the end-of-attributes marker.
async fn negotiate<S>(
    conn: &mut ControlConnection<S>,
    params: &HandshakeParams<'_>,
    plan: &MediaPlan,
    cfg: &FtlConfig,
) -> Result<Option<u16>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    for cmd in negotiation_commands(params, plan) {
        conn.send(&cmd).await?;
    }

    let resp = conn
        .request(&Command::EndAttributes, cfg.response_timeout)
        .await?;
    if !resp.is_ok() {
        return Err(FtlError::StreamRejected { code: resp.code });
    }

    Ok(resp.media_port())
}

/// The attribute block for this stream, in wire order
fn negotiation_commands(params: &HandshakeParams<'_>, plan: &MediaPlan) -> Vec<Command> {
    let mut cmds = vec![
        Command::attribute("ProtocolVersion", PROTOCOL_VERSION),
        Command::attribute("VendorName", env!("CARGO_PKG_NAME")),
        Command::attribute("VendorVersion", env!("CARGO_PKG_VERSION")),
    ];

    if let Some(video) = &params.video {
        if let Some(negotiated) = plan.video {
            cmds.push(Command::attribute("Video", "true"));
            cmds.push(Command::attribute("VideoCodec", video.codec().wire_name()));
            cmds.push(Command::attribute("VideoWidth", video.width()));
            cmds.push(Command::attribute("VideoHeight", video.height()));
            cmds.push(Command::attribute(
                "VideoPayloadType",
                negotiated.payload_type,
            ));
            cmds.push(Command::attribute("VideoIngestSSRC", negotiated.ssrc));
        } else {
            cmds.push(Command::attribute("Video", "false"));
        }
    }

    if let Some(audio) = &params.audio {
        if let Some(negotiated) = plan.audio {
            cmds.push(Command::attribute("Audio", "true"));
            cmds.push(Command::attribute("AudioCodec", audio.codec().wire_name()));
            cmds.push(Command::attribute(
                "AudioPayloadType",
                negotiated.payload_type,
            ));
            cmds.push(Command::attribute("AudioIngestSSRC", negotiated.ssrc));
        } else {
            cmds.push(Command::attribute("Audio", "false"));
        }
    }

    cmds
}

/// Resolve auto sentinels into final RTP parameters
///
/// Explicit values are kept as given. An auto payload type starts from the
/// kind's default and scans the dynamic range for the first value free of
/// its sibling; an auto SSRC is drawn randomly and redrawn while it is zero
/// or collides with its sibling. `Null`-codec components carry no media and
/// get no plan entry.
pub(crate) fn resolve_media_plan(
    audio: Option<&AudioComponent>,
    video: Option<&VideoComponent>,
) -> MediaPlan {
    let audio = audio.filter(|a| !a.codec().is_null());
    let video = video.filter(|v| !v.codec().is_null());

    let audio_pt_fixed = audio.and_then(|a| (!a.has_auto_payload_type()).then(|| a.payload_type()));

    // Video resolves against audio's explicit claim, then audio against the
    // resolved video value; defaults never collide with each other.
    let video_pt = video.map(|v| {
        if v.has_auto_payload_type() {
            pick_payload_type(DEFAULT_VIDEO_PAYLOAD_TYPE, audio_pt_fixed)
        } else {
            v.payload_type()
        }
    });
    let audio_pt = audio.map(|a| {
        if a.has_auto_payload_type() {
            pick_payload_type(DEFAULT_AUDIO_PAYLOAD_TYPE, video_pt)
        } else {
            a.payload_type()
        }
    });

    let video_ssrc = video.map(|v| v.ssrc());
    let audio_ssrc = audio.map(|a| a.ssrc());

    let video_ssrc = video_ssrc.map(|s| resolve_ssrc(s, audio_ssrc));
    let audio_ssrc = audio_ssrc.map(|s| resolve_ssrc(s, video_ssrc));

    MediaPlan {
        audio: audio_pt.zip(audio_ssrc).map(|(payload_type, ssrc)| {
            NegotiatedComponent { payload_type, ssrc }
        }),
        video: video_pt.zip(video_ssrc).map(|(payload_type, ssrc)| {
            NegotiatedComponent { payload_type, ssrc }
        }),
    }
}

/// First dynamic payload type free of the sibling, preferring `default`
fn pick_payload_type(default: u8, sibling: Option<u8>) -> u8 {
    if Some(default) != sibling {
        return default;
    }
    (RTP_DYNAMIC_PAYLOAD_MIN..=RTP_DYNAMIC_PAYLOAD_MAX)
        .find(|pt| Some(*pt) != sibling)
        .unwrap_or(default)
}

/// Keep an explicit SSRC; draw a fresh one for the auto sentinel
fn resolve_ssrc(ssrc: u32, sibling: Option<u32>) -> u32 {
    if ssrc != crate::component::AUTO_SSRC {
        return ssrc;
    }
    loop {
        let candidate: u32 = rand::random();
        if candidate != crate::component::AUTO_SSRC && Some(candidate) != sibling {
            return candidate;
        }
    }
}
